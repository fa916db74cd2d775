// src/manifest/xml.rs

//! `files.xml` codec
//!
//! ```xml
//! <Files>
//!     <File>
//!         <Path>usr/local/bin/htop</Path>
//!         <Type>executable</Type>
//!         <Uid>1000</Uid>
//!         <Gid>1000</Gid>
//!         <Mode>0755</Mode>
//!         <Hash>4c2629bd...</Hash>
//!     </File>
//! </Files>
//! ```

use super::{FileType, Manifest, ManifestEntry};
use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::path::{Component, Path};

fn xml_error(e: quick_xml::Error) -> Error {
    Error::ParseError(format!("Failed to write files.xml: {}", e))
}

pub(super) fn to_xml(manifest: &Manifest) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    writer
        .write_event(Event::Start(BytesStart::new("Files")))
        .map_err(xml_error)?;

    for entry in &manifest.entries {
        writer
            .write_event(Event::Start(BytesStart::new("File")))
            .map_err(xml_error)?;

        let fields = [
            ("Path", entry.path.clone()),
            ("Type", entry.file_type.as_str().to_string()),
            ("Uid", entry.uid.to_string()),
            ("Gid", entry.gid.to_string()),
            ("Mode", entry.mode.clone()),
            ("Hash", entry.hash.clone()),
        ];
        for (tag, value) in &fields {
            writer
                .create_element(*tag)
                .write_text_content(BytesText::new(value))
                .map_err(xml_error)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("File")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("Files")))
        .map_err(xml_error)?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::ParseError(format!("files.xml is not UTF-8: {}", e)))
}

/// Fields of the `<File>` element currently being read
#[derive(Default)]
struct EntryBuilder {
    path: Option<String>,
    file_type: Option<String>,
    uid: Option<String>,
    gid: Option<String>,
    mode: Option<String>,
    hash: Option<String>,
}

impl EntryBuilder {
    fn set(&mut self, tag: &str, text: String) {
        match tag {
            "Path" => self.path = Some(text),
            "Type" => self.file_type = Some(text),
            "Uid" => self.uid = Some(text),
            "Gid" => self.gid = Some(text),
            "Mode" => self.mode = Some(text),
            "Hash" => self.hash = Some(text),
            _ => {}
        }
    }

    fn build(self) -> Result<ManifestEntry> {
        let path = self
            .path
            .ok_or_else(|| Error::ParseError("File record without a Path".to_string()))?;
        validate_path(&path)?;

        let file_type = match self.file_type {
            Some(t) => t.parse::<FileType>().map_err(Error::ParseError)?,
            None => FileType::Data,
        };

        let parse_id = |value: Option<String>, field: &str| -> Result<u32> {
            match value {
                Some(v) => v.trim().parse::<u32>().map_err(|e| {
                    Error::ParseError(format!("Invalid {} for {}: {}", field, path, e))
                }),
                None => Ok(0),
            }
        };
        let uid = parse_id(self.uid, "Uid")?;
        let gid = parse_id(self.gid, "Gid")?;

        Ok(ManifestEntry {
            path,
            file_type,
            uid,
            gid,
            mode: self.mode.unwrap_or_default(),
            hash: self.hash.unwrap_or_default(),
        })
    }
}

/// Recorded paths must stay relative and free of `..`
fn validate_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    if path.is_empty() || p.has_root() {
        return Err(Error::ParseError(format!("Invalid manifest path: {:?}", path)));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::PathTraversal(path.to_string()));
    }
    Ok(())
}

pub(super) fn from_xml(content: &str) -> Result<Manifest> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<EntryBuilder> = None;
    let mut current_tag = String::new();
    let mut seen_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag_name.as_str() {
                    "Files" => seen_root = true,
                    "File" => current = Some(EntryBuilder::default()),
                    _ => {}
                }
                current_tag = tag_name;
            }
            Ok(Event::Empty(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag_name.as_str() {
                    "Files" => seen_root = true,
                    "File" => {
                        return Err(Error::ParseError("Empty File record".to_string()));
                    }
                    _ => {
                        if let Some(ref mut builder) = current {
                            builder.set(&tag_name, String::new());
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut builder) = current {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Bad text in files.xml: {}", e)))?
                        .to_string();
                    builder.set(&current_tag, text);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"File" {
                    if let Some(builder) = current.take() {
                        entries.push(builder.build()?);
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!("Failed to parse files.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(Error::ParseError("files.xml has no Files element".to_string()));
    }

    Ok(Manifest { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, file_type: FileType) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            file_type,
            uid: 1000,
            gid: 100,
            mode: "0755".to_string(),
            hash: "ab".repeat(32),
        }
    }

    #[test]
    fn test_layout_matches_legacy_files_xml() {
        let manifest = Manifest {
            entries: vec![entry("usr/local/bin/htop", FileType::Executable)],
        };
        let xml = to_xml(&manifest).unwrap();

        assert!(xml.starts_with("<Files>\n    <File>\n        <Path>usr/local/bin/htop</Path>"));
        assert!(xml.contains("<Type>executable</Type>"));
        assert!(xml.contains("<Uid>1000</Uid>"));
        assert!(xml.contains("<Mode>0755</Mode>"));
        assert!(xml.trim_end().ends_with("</Files>"));
        assert_eq!(from_xml(&xml).unwrap(), manifest);
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let manifest = Manifest {
            entries: vec![entry("usr/share/doc/a&b <c>.txt", FileType::Doc)],
        };
        let xml = to_xml(&manifest).unwrap();
        assert!(xml.contains("a&amp;b &lt;c&gt;.txt"));
        assert_eq!(from_xml(&xml).unwrap().entries[0].path, "usr/share/doc/a&b <c>.txt");
    }

    #[test]
    fn test_reads_legacy_output() {
        let legacy = r#"<Files>
    <File>
        <Path>usr/local/share/doc/tool/readme</Path>
        <Type>data</Type>
        <Uid>0</Uid>
        <Gid>0</Gid>
        <Mode>0644</Mode>
        <Hash>e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855</Hash>
    </File>
</Files>"#;
        let manifest = from_xml(legacy).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].mode, "0644");
        assert_eq!(manifest.entries[0].file_type, FileType::Data);
    }

    #[test]
    fn test_empty_manifest() {
        let xml = to_xml(&Manifest::default()).unwrap();
        assert!(from_xml(&xml).unwrap().entries.is_empty());
        assert!(from_xml("<Files/>").unwrap().entries.is_empty());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let xml = "<Files><File><Path>../../etc/shadow</Path></File></Files>";
        assert!(matches!(from_xml(xml), Err(Error::PathTraversal(_))));

        let xml = "<Files><File><Path>/etc/shadow</Path></File></Files>";
        assert!(matches!(from_xml(xml), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(from_xml("not xml at all"), Err(Error::ParseError(_))));
        assert!(matches!(
            from_xml("<Files><File><Path>x</Path><Uid>root</Uid></File></Files>"),
            Err(Error::ParseError(_))
        ));
    }
}
