//! Regenerating the splice point of a filter document from a set of
//! references.
//!
//! Two artifacts are produced from the same ordered reference list: the raw
//! fetch fragment stored on the outer link and the condition list stored on
//! the inner link's filter. Both are computed before either is written, so a
//! document is either fully rewritten or left as it was.

use std::fmt::Write as _;

use serde_json::{Map, Value as Json};

use super::{Condition, DocumentError, FilterDocument, FilterNode, LinkNode};
use crate::model::EntityRef;
use crate::query::xml_escape;

/// What each generated condition looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTemplate {
    /// Attribute compared against the reference id (`ctail_groupid`).
    pub attribute: String,
    /// Entity tag shown by the portal (`ctail_group`).
    pub type_tag: String,
}

impl ConditionTemplate {
    pub fn new(attribute: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            type_tag: type_tag.into(),
        }
    }
}

impl Default for ConditionTemplate {
    fn default() -> Self {
        Self::new("ctail_groupid", "ctail_group")
    }
}

pub(super) struct Splice<'a> {
    pub outer: &'a LinkNode,
    pub inner: &'a LinkNode,
    pub filter: &'a FilterNode,
}

fn only<'a, T>(items: &'a [T], path: &'static str) -> Result<&'a T, DocumentError> {
    match items {
        [item] => Ok(item),
        _ => Err(DocumentError::MissingSplice {
            path,
            found: items.len(),
        }),
    }
}

fn only_mut<'a, T>(items: &'a mut [T], path: &'static str) -> Result<&'a mut T, DocumentError> {
    let found = items.len();
    match items {
        [item] => Ok(item),
        _ => Err(DocumentError::MissingSplice { path, found }),
    }
}

pub(super) fn locate(doc: &FilterDocument) -> Result<Splice<'_>, DocumentError> {
    let outer = only(&doc.entity.links, "entity.links")?;
    let inner = only(&outer.links, "entity.links[0].links")?;
    let filter = only(&inner.filters, "entity.links[0].links[0].filters")?;
    Ok(Splice {
        outer,
        inner,
        filter,
    })
}

fn slots(
    doc: &mut FilterDocument,
) -> Result<(&mut Option<String>, &mut Vec<Condition>), DocumentError> {
    let LinkNode {
        raw_fetch, links, ..
    } = only_mut(&mut doc.entity.links, "entity.links")?;
    let inner = only_mut(links, "entity.links[0].links")?;
    let filter = only_mut(&mut inner.filters, "entity.links[0].links[0].filters")?;
    Ok((raw_fetch, &mut filter.conditions))
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(out, " {name}='{}'", xml_escape(value));
    }
}

/// The raw fetch fragment for `refs`: an `or` filter with one condition per
/// reference, nested inside copies of the outer and inner link heads.
#[must_use]
pub fn raw_fragment(
    outer: &LinkNode,
    inner: &LinkNode,
    refs: &[EntityRef],
    template: &ConditionTemplate,
) -> String {
    let mut out = String::from("<link-entity");
    push_attr(&mut out, "name", Some(&outer.name));
    push_attr(&mut out, "from", Some(&outer.from));
    push_attr(&mut out, "to", Some(&outer.to));
    push_attr(&mut out, "visible", outer.visible.as_deref());
    push_attr(&mut out, "intersect", outer.intersect.as_deref());
    out.push_str("><link-entity");
    push_attr(&mut out, "name", Some(&inner.name));
    push_attr(&mut out, "from", Some(&inner.from));
    push_attr(&mut out, "to", Some(&inner.to));
    push_attr(&mut out, "alias", inner.alias.as_deref());
    out.push_str("><filter type='or'>");

    for r in refs {
        let _ = write!(
            out,
            "<condition attribute='{}' operator='eq' uiname='{}' uitype='{}' value='{}' />",
            xml_escape(&template.attribute),
            xml_escape(&r.label()),
            xml_escape(&template.type_tag),
            r.id
        );
    }

    out.push_str("</filter></link-entity></link-entity>");
    out
}

fn conditions(refs: &[EntityRef], template: &ConditionTemplate) -> Vec<Condition> {
    refs.iter()
        .enumerate()
        .map(|(ordinal, r)| Condition {
            attribute: Some(template.attribute.clone()),
            operator: Some("eq".to_string()),
            ui_label: Some(r.label()),
            type_tag: Some(template.type_tag.clone()),
            value: Some(Json::String(r.id.to_string())),
            id: Some(Json::String(ordinal.to_string())),
            extra: Map::new(),
        })
        .collect()
}

/// Replace the splice point of `doc` with content generated from `refs`.
///
/// An empty `refs` yields an empty `or` filter and an empty condition list.
///
/// # Errors
///
/// Returns [`DocumentError::MissingSplice`] when `doc` does not have exactly
/// one entry at each level of the splice path. `doc` is consumed either way;
/// callers keep their stored copy untouched.
pub fn rewrite(
    mut doc: FilterDocument,
    refs: &[EntityRef],
    template: &ConditionTemplate,
) -> Result<FilterDocument, DocumentError> {
    let fragment = {
        let splice = locate(&doc)?;
        raw_fragment(splice.outer, splice.inner, refs, template)
    };
    let generated = conditions(refs, template);

    let (raw_fetch, stored) = slots(&mut doc)?;
    *raw_fetch = Some(fragment);
    *stored = generated;
    Ok(doc)
}

/// Parse, rewrite and re-serialize a stored document.
///
/// # Errors
///
/// Returns a [`DocumentError`] when `text` cannot be parsed or lacks the
/// splice point.
pub fn rewrite_text(
    text: &str,
    refs: &[EntityRef],
    template: &ConditionTemplate,
) -> Result<String, DocumentError> {
    rewrite(FilterDocument::parse(text)?, refs, template)?.to_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::fixtures::STORED;
    use uuid::Uuid;

    fn group(n: u128, name: Option<&str>) -> EntityRef {
        let r = EntityRef::new("ctail_group", Uuid::from_u128(n));
        match name {
            Some(name) => r.with_name(name),
            None => r,
        }
    }

    fn stored() -> FilterDocument {
        FilterDocument::parse(STORED).expect("parse fixture")
    }

    #[test]
    fn rewrites_fragment_and_conditions_in_order() {
        let refs = [group(10, Some("Backend")), group(11, None), group(12, Some("Ops"))];
        let doc = rewrite(stored(), &refs, &ConditionTemplate::default()).expect("rewrite");

        let conditions = doc.spliced_conditions().expect("splice");
        let labels: Vec<&str> = conditions.iter().filter_map(|c| c.ui_label.as_deref()).collect();
        assert_eq!(labels, vec!["Backend", &*Uuid::from_u128(11).to_string(), "Ops"]);
        assert_eq!(
            conditions.iter().map(Condition::ordinal).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
        let text = doc.to_text().expect("serialize");
        assert!(text.contains(r#""adx.id":"2""#));

        let fragment = doc.entity.links[0].raw_fetch.as_deref().expect("fragment");
        assert!(fragment.starts_with(
            "<link-entity name='ctail_ctail_group_ctail_training' from='ctail_trainingid' \
             to='ctail_trainingid' visible='false' intersect='true'>\
             <link-entity name='ctail_group' from='ctail_groupid' to='ctail_groupid' alias='ad'>\
             <filter type='or'>"
        ));
        let first = fragment.find("uiname='Backend'").expect("first");
        let last = fragment.find("uiname='Ops'").expect("last");
        assert!(first < last);
    }

    #[test]
    fn empty_refs_leave_a_valid_empty_filter() {
        let doc = rewrite(stored(), &[], &ConditionTemplate::default()).expect("rewrite");
        assert!(doc.spliced_conditions().expect("splice").is_empty());
        let fragment = doc.entity.links[0].raw_fetch.as_deref().expect("fragment");
        assert!(fragment.contains("<filter type='or'></filter>"));

        let text = doc.to_text().expect("serialize");
        assert!(text.contains(r#""conditions":[]"#));
    }

    #[test]
    fn labels_are_escaped_in_the_fragment_only() {
        let refs = [group(1, Some("R&D <West>"))];
        let doc = rewrite(stored(), &refs, &ConditionTemplate::default()).expect("rewrite");
        let fragment = doc.entity.links[0].raw_fetch.as_deref().expect("fragment");
        assert!(fragment.contains("uiname='R&amp;D &lt;West&gt;'"));
        assert_eq!(
            doc.spliced_conditions().expect("splice")[0].ui_label.as_deref(),
            Some("R&D <West>")
        );
    }

    #[test]
    fn missing_splice_fails_closed() {
        let mut doc = stored();
        doc.entity.links[0].links.clear();
        let err = rewrite(doc, &[group(1, None)], &ConditionTemplate::default()).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::MissingSplice {
                path: "entity.links[0].links",
                found: 0
            }
        ));
    }

    #[test]
    fn two_outer_links_are_ambiguous() {
        let mut doc = stored();
        let copy = doc.entity.links[0].clone();
        doc.entity.links.push(copy);
        let err = rewrite(doc, &[], &ConditionTemplate::default()).unwrap_err();
        assert!(matches!(err, DocumentError::MissingSplice { found: 2, .. }));
    }

    #[test]
    fn loosely_shaped_conditions_do_not_block_a_rewrite() {
        let mut doc = stored();
        doc.entity.filters = vec![serde_json::from_str(
            r#"{"type":"and","conditions":[{"attribute":"statecode","operator":"eq","value":"0"}]}"#,
        )
        .expect("base filter")];
        let text = doc.to_text().expect("serialize");
        // drop the panel members from the stored splice condition as well
        let text = text.replace(r#","adx.id":"0""#, "").replace(r#""uiname":"Old","#, "");

        let out = rewrite_text(&text, &[group(5, Some("QA"))], &ConditionTemplate::default())
            .expect("rewrite");
        let doc = FilterDocument::parse(&out).expect("reparse");
        assert_eq!(
            doc.entity.filters[0].conditions[0].attribute.as_deref(),
            Some("statecode")
        );
        let spliced = doc.spliced_conditions().expect("splice");
        assert_eq!(spliced.len(), 1);
        assert_eq!(spliced[0].ui_label.as_deref(), Some("QA"));
        assert_eq!(spliced[0].ordinal(), Some(0));
    }

    #[test]
    fn rewrite_text_preserves_unrelated_content() {
        let text = rewrite_text(STORED, &[group(5, Some("QA"))], &ConditionTemplate::default())
            .expect("rewrite");
        let doc = FilterDocument::parse(&text).expect("reparse");
        assert_eq!(doc.xmlns_adx.as_deref(), Some("http://schemas.adxstudio.com/fetch/"));
        assert_eq!(doc.entity.links[0].links[0].filters[0].ui_name.as_deref(), Some("Group"));
    }
}
