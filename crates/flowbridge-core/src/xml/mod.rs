//! XML support: an owned DOM, an XPath subset and SOAP framing.

pub mod dom;
pub mod soap;
pub mod xpath;

pub use dom::{is_well_formed, XmlAttribute, XmlDocument, XmlElement, XmlNode};
pub use xpath::{select_first_value, set_value, XPath, XPathMatch};
