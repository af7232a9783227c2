//! Type descriptors parsed from declared class strings.
//!
//! A branch holding an object declares a C++-style class string such as
//! `edm::Wrapper<std::vector<pat::Muon> >`. It is parsed once into a
//! [`TypeDescriptor`] (namespace path plus template arguments) so the
//! [`TypeRegistry`](super::TypeRegistry) can resolve it structurally.

use smallvec::SmallVec;
use std::fmt;

use crate::util::{Error, Result};

/// Structured form of a class string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// Namespace path, outermost first (`["edm", "Wrapper"]`).
    path: SmallVec<[String; 3]>,
    /// Template arguments.
    args: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Parse a class string.
    pub fn parse(class_name: &str) -> Result<Self> {
        let mut parser = Parser { src: class_name, pos: 0 };
        let desc = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != class_name.len() {
            return Err(Error::InvalidTypeDescriptor(class_name.to_string()));
        }
        Ok(desc)
    }

    /// Build a non-template descriptor from a qualified name.
    pub fn named(name: &str) -> Result<Self> {
        Self::parse(name)
    }

    /// Fully qualified name without template arguments (`edm::Wrapper`).
    pub fn name(&self) -> String {
        self.path.join("::")
    }

    /// Unqualified name (`Wrapper`).
    pub fn base_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Namespace segments before the base name.
    pub fn namespace(&self) -> &[String] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    pub fn args(&self) -> &[TypeDescriptor] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&TypeDescriptor> {
        self.args.get(index)
    }

    pub fn is_template(&self) -> bool {
        !self.args.is_empty()
    }

    /// True if the qualified name is one of `names`.
    pub fn is(&self, names: &[&str]) -> bool {
        let name = self.name();
        names.iter().any(|n| *n == name)
    }

    /// Canonical spelling used as registry key: no whitespace around
    /// separators and no space between closing brackets.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for TypeDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn err(&self) -> Error {
        Error::InvalidTypeDescriptor(self.src.to_string())
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b':' || c == b' ') {
            self.pos += 1;
        }
        // "unsigned int" keeps its inner space; separators lose theirs
        let words: Vec<&str> = self.src[start..self.pos].split_whitespace().collect();
        let name = words.join(" ").replace(" ::", "::").replace(":: ", "::");
        let name = name.strip_prefix("::").unwrap_or(&name);
        if name.is_empty() {
            return Err(self.err());
        }
        let path: SmallVec<[String; 3]> = name.split("::").map(str::to_string).collect();
        if path.iter().any(|seg| seg.is_empty() || seg.contains(':')) {
            return Err(self.err());
        }

        let mut args = Vec::new();
        if self.peek() == Some(b'<') {
            self.pos += 1;
            loop {
                args.push(self.parse_type()?);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b'>') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.err()),
                }
            }
        }
        Ok(TypeDescriptor { path, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapper() {
        let d = TypeDescriptor::parse("edm::Wrapper<std::vector<pat::Muon> >").unwrap();
        assert_eq!(d.name(), "edm::Wrapper");
        assert_eq!(d.base_name(), "Wrapper");
        assert_eq!(d.namespace(), ["edm".to_string()]);
        assert_eq!(d.args().len(), 1);
        let v = d.arg(0).unwrap();
        assert!(v.is(&["std::vector", "vector"]));
        assert_eq!(v.arg(0).unwrap().name(), "pat::Muon");
        assert_eq!(d.canonical(), "edm::Wrapper<std::vector<pat::Muon>>");
    }

    #[test]
    fn test_parse_multiword_and_multiarg() {
        let d = TypeDescriptor::parse("std::map< unsigned int , std::string >").unwrap();
        assert_eq!(d.args()[0].name(), "unsigned int");
        assert_eq!(d.args()[1].name(), "std::string");
        assert_eq!(d.to_string(), "std::map<unsigned int,std::string>");

        let d: TypeDescriptor = "::reco::Track".parse().unwrap();
        assert_eq!(d.name(), "reco::Track");
        assert!(!d.is_template());
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "vector<int", "vector<>", "a::::b", "x<int>>", "edm::Wrapper<int>junk<"] {
            assert!(
                matches!(TypeDescriptor::parse(bad), Err(Error::InvalidTypeDescriptor(_))),
                "{bad:?} should not parse"
            );
        }
    }
}
