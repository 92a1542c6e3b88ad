//! Parsers for `--xml` output of `info`, `status`, `log` and `ls`.

use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::error::SvnError;
use crate::types::{EntryKind, ListEntry, Revision, StatusEntry, WcStatus};

/// One `entry` of `svn info --xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEntry {
    pub path: String,
    pub kind: Option<EntryKind>,
    pub revision: Option<String>,
    pub url: Option<String>,
    pub wc_root: Option<PathBuf>,
}

fn parse_document(xml: &str) -> Result<Document<'_>, SvnError> {
    Document::parse(xml).map_err(|e| SvnError::Parse(e.to_string()))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).map(|n| n.text().unwrap_or_default().to_string())
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, SvnError> {
    node.attribute(name).ok_or_else(|| {
        SvnError::Parse(format!(
            "<{}> is missing the '{}' attribute",
            node.tag_name().name(),
            name
        ))
    })
}

fn entries<'a, 'input: 'a>(
    doc: &'a Document<'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    doc.descendants().filter(move |n| n.has_tag_name(name))
}

/// Parse `svn info --xml`.
pub fn parse_info(xml: &str) -> Result<Vec<InfoEntry>, SvnError> {
    let doc = parse_document(xml)?;
    entries(&doc, "entry")
        .map(|entry| {
            Ok(InfoEntry {
                path: required_attr(entry, "path")?.to_string(),
                kind: entry.attribute("kind").and_then(|k| k.parse().ok()),
                revision: entry.attribute("revision").map(str::to_string),
                url: child_text(entry, "url"),
                wc_root: child(entry, "wc-info")
                    .and_then(|info| child_text(info, "wcroot-abspath"))
                    .map(PathBuf::from),
            })
        })
        .collect()
}

/// Parse `svn status --xml`.
///
/// Paths are returned as svn printed them.
pub fn parse_status(xml: &str) -> Result<Vec<StatusEntry>, SvnError> {
    let doc = parse_document(xml)?;
    entries(&doc, "entry")
        .map(|entry| {
            let path = required_attr(entry, "path")?;
            let wc_status = child(entry, "wc-status").ok_or_else(|| {
                SvnError::Parse(format!("entry {} has no <wc-status>", path))
            })?;
            let item = required_attr(wc_status, "item")?;
            Ok(StatusEntry {
                path: PathBuf::from(path),
                item: item.parse().unwrap_or(WcStatus::Other(item.to_string())),
            })
        })
        .collect()
}

/// Parse `svn log --xml`, keeping svn's newest-first order.
pub fn parse_log(xml: &str) -> Result<Vec<Revision>, SvnError> {
    let doc = parse_document(xml)?;
    entries(&doc, "logentry")
        .map(|entry| {
            Ok(Revision {
                number: required_attr(entry, "revision")?.to_string(),
                author: child_text(entry, "author").unwrap_or_default(),
                date: child_text(entry, "date").unwrap_or_default(),
                message: child_text(entry, "msg")
                    .map(|m| m.trim().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Parse `svn ls --xml`; entry paths are joined onto `base`.
///
/// Directories sort before files, then by name.
pub fn parse_list(xml: &str, base: &Path) -> Result<Vec<ListEntry>, SvnError> {
    let doc = parse_document(xml)?;
    let mut listed = entries(&doc, "entry")
        .map(|entry| {
            let kind = required_attr(entry, "kind")?
                .parse::<EntryKind>()
                .map_err(SvnError::Parse)?;
            let name = child_text(entry, "name")
                .ok_or_else(|| SvnError::Parse("list entry has no <name>".to_string()))?;
            Ok(ListEntry {
                kind,
                path: base.join(&name),
                name,
            })
        })
        .collect::<Result<Vec<_>, SvnError>>()?;
    listed.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    Ok(listed)
}
