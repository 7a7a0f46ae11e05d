//! Book-level helpers: archive sniffing, metadata normalisation, table of contents.

use std::io::{Cursor, Read};

use serde::Serialize;

use crate::error::ReaderError;
use crate::types::{NavPoint, RawMetadata};

const ZIP_MAGIC: &[u8] = b"PK";
const EPUB_MIMETYPE: &str = "application/epub+zip";
const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Check that `bytes` look like an EPUB before handing them to the engine.
pub fn validate_archive(bytes: &[u8]) -> Result<(), ReaderError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ReaderError::Load("not an epub book".to_string()));
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ReaderError::Load(format!("unreadable archive: {err}")))?;

    if let Ok(mut entry) = archive.by_name("mimetype") {
        let mut mimetype = String::new();
        entry
            .read_to_string(&mut mimetype)
            .map_err(|err| ReaderError::Load(format!("unreadable mimetype entry: {err}")))?;
        if mimetype.trim() != EPUB_MIMETYPE {
            return Err(ReaderError::Load(format!("unexpected mimetype {:?}", mimetype.trim())));
        }
    }

    if archive.by_name(CONTAINER_PATH).is_err() {
        return Err(ReaderError::Load(format!("missing {CONTAINER_PATH}")));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub series: Option<String>,
    pub series_index: Option<String>,
    pub description: String,
    pub cover_url: Option<String>,
}

impl BookMetadata {
    pub fn from_raw(raw: &RawMetadata) -> Self {
        let non_empty = |value: &Option<String>| {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        };
        let series = non_empty(&raw.series);
        let series_index = series.as_ref().and_then(|_| non_empty(&raw.series_index));
        Self {
            title: raw.title.trim().to_string(),
            author: raw.creator.trim().to_string(),
            series,
            series_index,
            description: raw.description.trim().to_string(),
            cover_url: None,
        }
    }
}

/// Flattened navigation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub label: String,
    pub href: String,
    pub depth: usize,
    pub active: bool,
}

/// Depth-first flattening of the navigation tree.
pub fn flatten_toc(points: &[NavPoint]) -> Vec<TocEntry> {
    fn walk(points: &[NavPoint], depth: usize, out: &mut Vec<TocEntry>) {
        for point in points {
            out.push(TocEntry {
                label: point.label.trim().to_string(),
                href: point.href.clone(),
                depth,
                active: false,
            });
            walk(&point.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(points, 0, &mut out);
    out
}

/// Flag the entries whose canonical href equals `current`.
pub fn mark_active<F>(toc: &mut [TocEntry], current: &str, canonical: F)
where
    F: Fn(&str) -> String,
{
    let current = canonical(current);
    for entry in toc {
        entry.active = canonical(&entry.href) == current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn accepts_minimal_epub() {
        let bytes = archive(&[("mimetype", EPUB_MIMETYPE), (CONTAINER_PATH, "<container/>")]);
        assert!(validate_archive(&bytes).is_ok());
    }

    #[test]
    fn rejects_non_zip_input() {
        let err = validate_archive(b"%PDF-1.7").unwrap_err();
        assert_eq!(err, ReaderError::Load("not an epub book".to_string()));
    }

    #[test]
    fn rejects_wrong_mimetype() {
        let bytes = archive(&[("mimetype", "application/zip"), (CONTAINER_PATH, "")]);
        assert!(matches!(validate_archive(&bytes), Err(ReaderError::Load(msg)) if msg.contains("mimetype")));
    }

    #[test]
    fn rejects_missing_container() {
        let bytes = archive(&[("mimetype", EPUB_MIMETYPE)]);
        assert!(validate_archive(&bytes).is_err());
    }

    #[test]
    fn metadata_is_trimmed_and_blank_series_dropped() {
        let raw = RawMetadata {
            title: "  Captain Blood \n".into(),
            creator: " Rafael Sabatini".into(),
            series: Some("   ".into()),
            series_index: Some("2".into()),
            description: String::new(),
        };
        let meta = BookMetadata::from_raw(&raw);
        assert_eq!(meta.title, "Captain Blood");
        assert_eq!(meta.author, "Rafael Sabatini");
        assert_eq!(meta.series, None);
        assert_eq!(meta.series_index, None);
    }

    #[test]
    fn toc_is_flattened_depth_first() {
        let tree = vec![
            NavPoint {
                label: "Part I".into(),
                href: "part1.xhtml".into(),
                children: vec![NavPoint {
                    label: " Chapter 1 ".into(),
                    href: "ch1.xhtml#start".into(),
                    children: Vec::new(),
                }],
            },
            NavPoint { label: "Part II".into(), href: "part2.xhtml".into(), children: Vec::new() },
        ];
        let mut toc = flatten_toc(&tree);
        let labels: Vec<(&str, usize)> = toc.iter().map(|e| (e.label.as_str(), e.depth)).collect();
        assert_eq!(labels, vec![("Part I", 0), ("Chapter 1", 1), ("Part II", 0)]);

        mark_active(&mut toc, "ch1.xhtml", |href| href.split('#').next().unwrap_or(href).to_string());
        assert!(toc[1].active);
        assert!(!toc[0].active);
    }
}
