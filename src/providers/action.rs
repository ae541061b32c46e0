//! ACS action header encoding
//!
//! Every NetStorage request carries its operation in the
//! `X-Akamai-ACS-Action` header:
//!
//! ```text
//! version=1&action=<name>[&key=value...][&format=xml]
//! ```
//!
//! The rendered string is signed byte-for-byte, so parameter order matters.

use std::fmt;

/// Header carrying the rendered action directive
pub const ACTION_HEADER: &str = "x-akamai-acs-action";

/// Protocol version, fixed
pub const ACTION_VERSION: u32 = 1;

/// ACS operation names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    Upload,
    Download,
    Delete,
    Rename,
    Rmdir,
    Mkdir,
    Stat,
    Dir,
    List,
    Du,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Upload => "upload",
            ActionName::Download => "download",
            ActionName::Delete => "delete",
            ActionName::Rename => "rename",
            ActionName::Rmdir => "rmdir",
            ActionName::Mkdir => "mkdir",
            ActionName::Stat => "stat",
            ActionName::Dir => "dir",
            ActionName::List => "list",
            ActionName::Du => "du",
        }
    }

    /// Actions whose response body is an XML document
    pub fn wants_xml(&self) -> bool {
        matches!(
            self,
            ActionName::Dir | ActionName::Download | ActionName::Du | ActionName::Stat | ActionName::List
        )
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation plus its ordered parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDirective {
    name: ActionName,
    parameters: Vec<(String, String)>,
}

impl ActionDirective {
    pub fn new(name: ActionName) -> Self {
        Self {
            name,
            parameters: Vec::new(),
        }
    }

    /// Append a parameter; insertion order is kept in the rendered header
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> ActionName {
        self.name
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn wants_xml(&self) -> bool {
        self.name.wants_xml()
    }

    /// Render the header value
    pub fn render(&self) -> String {
        let mut header = format!(
            "version={}&action={}",
            ACTION_VERSION,
            urlencoding::encode(self.name.as_str())
        );

        if !self.parameters.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.parameters.iter())
                .finish();
            header.push('&');
            header.push_str(&query);
        }

        if self.wants_xml() {
            header.push_str("&format=xml");
        }

        header
    }
}

impl fmt::Display for ActionDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Render an action header from a name and ordered parameters
pub fn encode(name: ActionName, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(ActionDirective::new(name), |directive, (k, v)| directive.param(*k, *v))
        .render()
}
