//! Identity tagging through extensible storage.
//!
//! Every element created by a sync batch carries one `TetherInstanceTag`
//! record whose `InstanceID` field holds the batch identity. Lookup scans the
//! category's element class in document order and silently skips elements
//! without a readable record.

use tether_core::{Category, IdentityTag};
use uuid::Uuid;

use crate::document::{ElementClass, ElementId, Entity, HostDocument, Schema};
use crate::error::HostError;

pub const INSTANCE_SCHEMA_GUID: Uuid = Uuid::from_u128(0x6f3c_2a41_9d7e_4b58_a1c2_5e0d_8b4f_7a93);
pub const INSTANCE_SCHEMA_VENDOR: &str = "TETHER";
pub const INSTANCE_SCHEMA_NAME: &str = "TetherInstanceTag";
pub const INSTANCE_FIELD: &str = "InstanceID";

pub fn instance_schema() -> Schema {
    Schema {
        guid: INSTANCE_SCHEMA_GUID,
        vendor: INSTANCE_SCHEMA_VENDOR.to_string(),
        name: INSTANCE_SCHEMA_NAME.to_string(),
        fields: vec![INSTANCE_FIELD.to_string()],
    }
}

/// Attach `identity` to `id`, replacing any earlier tag.
pub fn tag<D: HostDocument + ?Sized>(
    doc: &mut D,
    id: ElementId,
    identity: &IdentityTag,
) -> Result<(), HostError> {
    let schema = instance_schema();
    if !doc.has_schema(schema.guid) {
        doc.register_schema(schema.clone())?;
    }
    doc.write_entity(id, Entity::new(&schema).with(INSTANCE_FIELD, identity.0.clone()))
}

/// The identity carried by `id`, if it has a readable tag.
pub fn identity_of<D: HostDocument + ?Sized>(doc: &D, id: ElementId) -> Option<IdentityTag> {
    let schema = instance_schema();
    if !doc.has_schema(schema.guid) {
        return None;
    }
    match doc.read_entity(id, &schema) {
        Ok(Some(entity)) => entity.get(INSTANCE_FIELD).map(IdentityTag::from),
        Ok(None) => None,
        Err(err) => {
            tracing::debug!(element = %id, error = %err, "unreadable tag skipped");
            None
        }
    }
}

/// Elements of `category`'s class tagged with exactly `identity`, in
/// document order.
pub fn lookup_by_identity<D: HostDocument + ?Sized>(
    doc: &D,
    category: &Category,
    identity: &IdentityTag,
) -> Vec<ElementId> {
    doc.elements(ElementClass::for_category(category))
        .into_iter()
        .filter(|id| identity_of(doc, *id).as_ref() == Some(identity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HostCurve, NativeCreate};
    use crate::memory::MemoryDocument;
    use tether_core::Point3;

    fn wall_at(doc: &mut MemoryDocument, y: f64) -> ElementId {
        let level = doc.levels()[0].id;
        doc.create(NativeCreate::Wall {
            curve: HostCurve::Line {
                start: Point3::new(0.0, y, 0.0),
                end: Point3::new(10.0, y, 0.0),
            },
            wall_type: "Generic - 8\"".into(),
            level,
            height: 10.0,
            base_offset: 0.0,
        })
        .expect("wall")
    }

    #[test]
    fn lookup_filters_exact_identity_in_document_order() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let a = wall_at(&mut doc, 0.0);
        let b = wall_at(&mut doc, 5.0);
        let c = wall_at(&mut doc, 10.0);
        let untagged = wall_at(&mut doc, 15.0);
        tag(&mut doc, c, &"abc".into()).expect("tag");
        tag(&mut doc, a, &"abc".into()).expect("tag");
        tag(&mut doc, b, &"abcd".into()).expect("tag");

        let found = lookup_by_identity(&doc, &Category::Walls, &"abc".into());
        assert_eq!(found, vec![a, c]);
        assert!(!found.contains(&untagged));
        assert!(lookup_by_identity(&doc, &Category::Floors, &"abc".into()).is_empty());
    }

    #[test]
    fn retag_overwrites() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let a = wall_at(&mut doc, 0.0);
        tag(&mut doc, a, &"first".into()).expect("tag");
        tag(&mut doc, a, &"second".into()).expect("tag");
        assert_eq!(identity_of(&doc, a), Some(IdentityTag::from("second")));
        assert!(lookup_by_identity(&doc, &Category::Walls, &"first".into()).is_empty());
    }

    #[test]
    fn lookup_without_schema_is_empty() {
        let doc = MemoryDocument::sample();
        assert!(lookup_by_identity(&doc, &Category::Walls, &"x".into()).is_empty());
    }
}
