//! XML response parsing and metadata normalization
//!
//! `stat`, `dir` and `list` responses share one shape:
//!
//! ```xml
//! <stat directory="/123456/test">
//!   <file type="file" name="example.txt" mtime="1400000000" size="5" md5="..."/>
//! </stat>
//! ```
//!
//! A `list` page may also carry `<resume start="..."/>` with the cursor of
//! the next page. `list` entries usually have no enclosing directory and
//! carry the full path in `name` instead.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use super::paths::{self, PathPrefix};
use super::{DiskUsage, EntryType, MetadataRecord, ProviderError};

/// Fields of `MetadataRecord` that backend attributes may not overwrite
const RESERVED_FIELDS: &[&str] = &[
    "type", "path", "name", "visibility", "timestamp", "size", "checksum", "mimetype",
];

/// Attributes mapped onto dedicated record fields
const MAPPED_ATTRIBUTES: &[&str] = &["type", "name", "mtime", "size", "md5", "mimetype"];

/// One `<file>` element, attributes in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileNode {
    pub attributes: Vec<(String, String)>,
}

impl FileNode {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn from_element(e: &BytesStart) -> Self {
        Self {
            attributes: collect_attributes(e),
        }
    }
}

/// One parsed response page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// `directory` attribute of the root element, empty when absent
    pub directory: String,
    pub files: Vec<FileNode>,
    /// Cursor of the next page
    pub resume: Option<String>,
}

fn collect_attributes(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or(raw);
            (key, value)
        })
        .collect()
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    collect_attributes(e)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// Parse a `stat` / `dir` / `list` response body
pub fn parse_listing(xml: &str) -> Result<ListingPage, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListingPage::default();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if !seen_root {
                    seen_root = true;
                    page.directory = attribute(e, "directory").unwrap_or_default();
                } else {
                    match e.name().as_ref() {
                        b"file" => page.files.push(FileNode::from_element(e)),
                        b"resume" => page.resume = attribute(e, "start").filter(|s| !s.is_empty()),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProviderError::ParseError(format!(
                    "Malformed ACS XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ProviderError::ParseError("Empty ACS XML document".to_string()));
    }

    Ok(page)
}

/// Parse a `du` response: `<du directory=".."><du-info files="n" bytes="n"/></du>`
pub fn parse_disk_usage(xml: &str) -> Result<DiskUsage, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut usage = DiskUsage::default();
    let mut seen_info = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"du" => usage.directory = attribute(e, "directory").unwrap_or_default(),
                b"du-info" => {
                    seen_info = true;
                    usage.files = attribute(e, "files").and_then(|v| v.parse().ok()).unwrap_or(0);
                    usage.bytes = attribute(e, "bytes").and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProviderError::ParseError(format!("Malformed du XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if !seen_info {
        return Err(ProviderError::ParseError("du response has no du-info element".to_string()));
    }
    Ok(usage)
}

/// Build the canonical record for one `<file>` node
///
/// Without a node the record describes `directory` itself.
pub fn normalize(directory: &str, file: Option<&FileNode>, prefix: &PathPrefix) -> MetadataRecord {
    let Some(file) = file else {
        return MetadataRecord {
            entry_type: EntryType::Dir,
            path: prefix.strip(directory),
            name: paths::basename(directory).to_string(),
            timestamp: String::new(),
            size: None,
            checksum: None,
            mimetype: None,
            visibility: "public".to_string(),
            extra: BTreeMap::new(),
        };
    };

    let raw_name = file.get("name").unwrap_or_default();
    let full_path = if directory.is_empty() {
        paths::join("", raw_name)
    } else {
        paths::join(directory, raw_name)
    };

    let entry_type = file
        .get("type")
        .and_then(EntryType::from_attr)
        .unwrap_or(EntryType::File);

    let mut extra = BTreeMap::new();
    for (key, value) in &file.attributes {
        if MAPPED_ATTRIBUTES.contains(&key.as_str()) || RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        extra.entry(key.clone()).or_insert_with(|| value.clone());
    }

    let name = paths::basename(&full_path).to_string();
    let mimetype = match file.get("mimetype") {
        Some(m) => Some(m.to_string()),
        None if entry_type != EntryType::Dir => Some(guess_mimetype(&name)),
        None => None,
    };

    MetadataRecord {
        entry_type,
        path: prefix.strip(&full_path),
        name,
        timestamp: file.get("mtime").unwrap_or_default().to_string(),
        size: file.get("size").map(str::to_string),
        checksum: file.get("md5").map(str::to_string),
        mimetype,
        visibility: "public".to_string(),
        extra,
    }
}

/// Extension-based mimetype, text/plain when unknown
pub fn guess_mimetype(name: &str) -> String {
    mime_guess::from_path(name).first_or_text_plain().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix() -> PathPrefix {
        PathPrefix::new("123456", Some("/test"))
    }

    #[test]
    fn test_parse_stat() {
        let xml = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
            <stat directory="/123456/test">
                <file type="file" name="image.jpg" mtime="1557047470" size="17" md5="4fd61fa9838732f3d114536fdb28aa2f"/>
            </stat>"#;
        let page = parse_listing(xml).unwrap();
        assert_eq!(page.directory, "/123456/test");
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].get("size"), Some("17"));
        assert!(page.resume.is_none());

        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert_eq!(record.entry_type, EntryType::File);
        assert_eq!(record.path, "/image.jpg");
        assert_eq!(record.name, "image.jpg");
        assert_eq!(record.timestamp, "1557047470");
        assert_eq!(record.size.as_deref(), Some("17"));
        assert_eq!(record.checksum.as_deref(), Some("4fd61fa9838732f3d114536fdb28aa2f"));
        assert_eq!(record.mimetype.as_deref(), Some("image/jpeg"));
        assert_eq!(record.visibility, "public");
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_parse_resume_cursor() {
        let xml = r#"<list><file type="file" name="123456/test/a.txt" mtime="1"/><resume start="123456/test/b.txt"/></list>"#;
        let page = parse_listing(xml).unwrap();
        assert_eq!(page.directory, "");
        assert_eq!(page.resume.as_deref(), Some("123456/test/b.txt"));

        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert_eq!(record.path, "/a.txt");
    }

    #[test]
    fn test_directory_gets_no_mimetype() {
        let page = parse_listing(r#"<stat directory="/123456/test"><file type="dir" name="sub" mtime="2" bytes="10" files="1"/></stat>"#).unwrap();
        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert!(record.is_dir());
        assert_eq!(record.path, "/sub");
        assert!(record.mimetype.is_none());
        assert_eq!(record.extra.get("bytes").map(String::as_str), Some("10"));
        assert_eq!(record.extra.get("files").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_unknown_extension_defaults_to_text_plain() {
        let page = parse_listing(r#"<stat directory="/123456/test"><file type="file" name="README" mtime="2"/></stat>"#).unwrap();
        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert_eq!(record.mimetype.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_reserved_attributes_do_not_leak_into_extra() {
        let page = parse_listing(
            r#"<stat directory="/123456/test"><file type="symlink" name="link" mtime="3" path="/evil" visibility="private" target="a.txt"/></stat>"#,
        )
        .unwrap();
        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert_eq!(record.entry_type, EntryType::Symlink);
        assert_eq!(record.path, "/link");
        assert_eq!(record.visibility, "public");
        assert!(!record.extra.contains_key("path"));
        assert!(!record.extra.contains_key("visibility"));
        assert_eq!(record.extra.get("target").map(String::as_str), Some("a.txt"));
    }

    #[test]
    fn test_escaped_names() {
        let page = parse_listing(r#"<stat directory="/123456/test"><file type="file" name="a&amp;b.txt" mtime="1"/></stat>"#).unwrap();
        let record = normalize(&page.directory, page.files.first(), &prefix());
        assert_eq!(record.name, "a&b.txt");
        assert_eq!(record.path, "/a&b.txt");
    }

    #[test]
    fn test_synthesized_directory_record() {
        let record = normalize("/123456/test/sub", None, &prefix());
        assert!(record.is_dir());
        assert_eq!(record.path, "/sub");
        assert_eq!(record.name, "sub");
    }

    #[test]
    fn test_prefix_free_path_unchanged() {
        let record = normalize("/docs", parse_listing(r#"<stat><file type="file" name="a.txt" mtime="1"/></stat>"#).unwrap().files.first(), &prefix());
        assert_eq!(record.path, "/docs/a.txt");
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(parse_listing("<stat><file></stat>"), Err(ProviderError::ParseError(_))));
        assert!(matches!(parse_listing(""), Err(ProviderError::ParseError(_))));
    }

    #[test]
    fn test_parse_disk_usage() {
        let usage = parse_disk_usage(r#"<du directory="/123456/test"><du-info files="12" bytes="4096"/></du>"#).unwrap();
        assert_eq!(usage.directory, "/123456/test");
        assert_eq!(usage.files, 12);
        assert_eq!(usage.bytes, 4096);
        assert!(parse_disk_usage("<du/>").is_err());
    }
}
