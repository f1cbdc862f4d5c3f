//! Object-level encode and decode
//!
//! Both directions walk the descriptor's field table in storage-name
//! order. Encode appends each field's attributes into one accumulator and
//! relies on the set's path uniqueness to catch collisions. Decode pairs
//! the same field order against the prefix groups of a sorted property
//! view in lock-step: groups sorting before the current field belong to
//! attributes no registered field claims any more and are skipped.

use crate::context::{DecodeCx, EncodeCx};
use crate::error::{DecodeError, EncodeError};
use crate::translator::{decode_value, encode_value, resolve};
use graft_core::limits::MAX_EMBED_DEPTH;
use graft_core::path::Path;
use graft_core::property::{PropertySet, PropsView};
use graft_core::schema::{FieldShape, TypeDescriptor};
use std::any::Any;

/// Flatten an instance's fields into properties under `path`
///
/// `depth` 0 is the record root, where key and parent fields feed the
/// encode context instead of producing attributes; at any other depth
/// those fields are skipped.
pub fn encode_object(
    cx: &mut EncodeCx<'_>,
    instance: &dyn Any,
    descriptor: &TypeDescriptor,
    path: &Path,
    depth: usize,
    indexed: bool,
) -> Result<PropertySet, EncodeError> {
    if depth > MAX_EMBED_DEPTH {
        return Err(EncodeError::DepthExceeded {
            path: path.clone(),
            max: MAX_EMBED_DEPTH,
        });
    }
    let root = depth == 0;
    let mut out = PropertySet::new();
    for field in descriptor.fields() {
        if !root && is_key_material(field.shape()) {
            continue;
        }
        let field_path = path.clone().child(field.name());
        let translator = resolve(field);
        let read = field.read(instance)?;
        encode_value(
            cx,
            &translator,
            read,
            &field_path,
            depth,
            indexed && field.policy().indexed,
            root,
            &mut out,
        )?;
    }
    Ok(out)
}

/// Rebuild an instance from the properties under `path`
///
/// Returns `Ok(None)` when the input is the single null marker at `path`
/// (the object itself is absent). An empty input builds a blank instance.
pub fn decode_object(
    cx: &DecodeCx<'_>,
    props: PropsView<'_>,
    descriptor: &TypeDescriptor,
    path: &Path,
    depth: usize,
) -> Result<Option<Box<dyn Any>>, DecodeError> {
    if props.is_null_marker(path) {
        return Ok(None);
    }
    let root = depth == 0;
    let mut instance = descriptor.construct();
    let mut groups = props.group_by_prefix(path).peekable();
    for field in descriptor.fields() {
        if !root && is_key_material(field.shape()) {
            continue;
        }
        let field_path = path.clone().child(field.name());
        while let Some(group) = groups.peek() {
            if group.prefix < field_path {
                groups.next();
            } else {
                break;
            }
        }
        let sub = match groups.peek() {
            Some(group) if group.prefix == field_path => group.props,
            _ => PropsView::empty(),
        };
        let translator = resolve(field);
        let write = decode_value(cx, &translator, sub, &field_path, depth, root)?;
        field
            .write(instance.as_mut(), write)
            .map_err(|source| DecodeError::Schema {
                path: field_path,
                source,
            })?;
    }
    Ok(Some(instance))
}

fn is_key_material(shape: &FieldShape) -> bool {
    matches!(shape, FieldShape::KeyId { .. } | FieldShape::Parent { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_convert::ConverterRegistry;
    use graft_core::datum::{Datum, DatumKind};
    use graft_core::key::{Ancestor, Key};
    use graft_core::property::Property;
    use graft_core::schema::{Registry, SchemaBuilder};
    use std::collections::BTreeMap;

    #[derive(Default, Debug, PartialEq, Clone)]
    struct Inner {
        my_name: String,
    }

    #[derive(Default, Debug, PartialEq, Clone)]
    struct Tag {
        word: String,
    }

    #[derive(Default, Debug, PartialEq)]
    struct Foo {
        id: i64,
        name: String,
        count: Option<i64>,
        scores: Vec<i64>,
        inner: Inner,
        extras: Vec<Inner>,
        labels: BTreeMap<String, Inner>,
        badge: Tag,
    }

    fn registry() -> Registry {
        let mut schema = SchemaBuilder::new();
        schema.kind::<Inner>("inner", |t| {
            t.field("my_name", |x: &Inner| &x.my_name, |x| &mut x.my_name);
        });
        schema.kind::<Tag>("tag", |t| {
            t.field("word", |x: &Tag| &x.word, |x| &mut x.word);
        });
        schema.kind::<Foo>("foo", |t| {
            t.id_int("id", |x| &x.id, |x| &mut x.id);
            t.field("name", |x: &Foo| &x.name, |x| &mut x.name);
            t.optional("count", |x: &Foo| &x.count, |x| &mut x.count);
            t.list("scores", |x: &Foo| &x.scores, |x| &mut x.scores);
            t.embedded("inner", |x: &Foo| &x.inner, |x| &mut x.inner);
            t.embedded_list("extras", |x: &Foo| &x.extras, |x| &mut x.extras);
            t.embedded_map("labels", |x: &Foo| &x.labels, |x| &mut x.labels);
            t.embedded("badge", |x: &Foo| &x.badge, |x| &mut x.badge)
                .collapse();
        });
        schema.seal().unwrap()
    }

    fn sample() -> Foo {
        Foo {
            id: 9,
            name: "foo1".into(),
            count: Some(4),
            scores: vec![3, 1],
            inner: Inner { my_name: "x".into() },
            extras: vec![
                Inner { my_name: "a".into() },
                Inner { my_name: "b".into() },
            ],
            labels: BTreeMap::from([
                ("one".to_string(), Inner { my_name: "1".into() }),
                ("two".to_string(), Inner { my_name: "2".into() }),
            ]),
            badge: Tag { word: "gold".into() },
        }
    }

    fn encode(reg: &Registry, conv: &ConverterRegistry, foo: &Foo) -> (PropertySet, crate::context::KeySpec) {
        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let mut cx = EncodeCx::new(reg, conv, descriptor.kind(), true);
        let props = encode_object(&mut cx, foo, &descriptor, &Path::root(), 0, true).unwrap();
        (props, cx.into_key_spec())
    }

    #[test]
    fn test_encode_flattens_to_expected_paths() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        let (props, spec) = encode(&reg, &conv, &sample());

        let paths: Vec<String> = props.iter().map(|p| p.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "badge",
                "count",
                "extras.my_name",
                "inner.my_name",
                "labels.one.my_name",
                "labels.two.my_name",
                "name",
                "scores",
            ]
        );
        assert_eq!(spec.id(), Some(&graft_core::key::IdValue::Int(9)));

        let extras = props.at(&"extras.my_name".parse().unwrap()).unwrap();
        assert_eq!(
            *extras.value(),
            Datum::List(vec![Datum::Text("a".into()), Datum::Text("b".into())])
        );
        let badge = props.at(&"badge".parse().unwrap()).unwrap();
        assert_eq!(*badge.value(), Datum::Text("gold".into()));
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        let original = sample();
        let (props, _) = encode(&reg, &conv, &original);

        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let key = Key::new("foo", 9);
        let cx = DecodeCx::new(&reg, &conv).with_key(&key);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        let foo = decoded.downcast_ref::<Foo>().unwrap();

        assert_eq!(*foo, original);
    }

    #[test]
    fn test_decode_populates_numeric_id_from_key() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let key = Key::new("foo", 9);
        let cx = DecodeCx::new(&reg, &conv).with_key(&key);
        let decoded = decode_object(&cx, PropsView::empty(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Foo>().unwrap().id, 9);
    }

    #[test]
    fn test_null_count_round_trips_to_none() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        let mut foo = sample();
        foo.count = None;
        let (props, _) = encode(&reg, &conv, &foo);
        // store_nulls keeps an explicit null attribute
        assert!(props.at(&"count".parse().unwrap()).unwrap().value().is_null());

        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let cx = DecodeCx::new(&reg, &conv);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Foo>().unwrap().count, None);
    }

    #[test]
    fn test_unclaimed_attributes_are_skipped() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        let mut props = PropertySet::new();
        props
            .insert(Property::new(
                "dropped_field".parse().unwrap(),
                Datum::Text("stale".into()),
                true,
            ))
            .unwrap();
        props
            .insert(Property::new(
                "name".parse().unwrap(),
                Datum::Text("kept".into()),
                true,
            ))
            .unwrap();

        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let cx = DecodeCx::new(&reg, &conv);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Foo>().unwrap().name, "kept");
    }

    #[test]
    fn test_stored_kind_migrates_on_decode() {
        let reg = registry();
        let conv = ConverterRegistry::standard();
        // A record written when `name` held numbers
        let mut props = PropertySet::new();
        props
            .insert(Property::new("name".parse().unwrap(), Datum::Int(12), true))
            .unwrap();

        let descriptor = reg.descriptor_of::<Foo>().unwrap().clone();
        let cx = DecodeCx::new(&reg, &conv);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Foo>().unwrap().name, "12");
    }

    #[test]
    fn test_embedded_depth_limit() {
        #[derive(Default)]
        struct Deep {
            label: String,
        }
        let mut schema = SchemaBuilder::new();
        schema.kind::<Deep>("deep", |t| {
            t.field("label", |x: &Deep| &x.label, |x| &mut x.label);
        });
        let reg = schema.seal().unwrap();
        let conv = ConverterRegistry::new();
        let descriptor = reg.descriptor_of::<Deep>().unwrap().clone();
        let mut cx = EncodeCx::new(&reg, &conv, "deep", true);
        let deep = Deep::default();
        let err = encode_object(
            &mut cx,
            &deep,
            &descriptor,
            &Path::root(),
            MAX_EMBED_DEPTH + 1,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::DepthExceeded { .. }));
    }

    #[test]
    fn test_parent_field_round_trip_by_key() {
        #[derive(Default, Debug, PartialEq)]
        struct Shelf {
            id: i64,
            room: String,
        }
        #[derive(Default, Debug)]
        struct Book {
            id: i64,
            title: String,
            shelf: Ancestor<Shelf>,
        }
        let mut schema = SchemaBuilder::new();
        schema.kind::<Shelf>("shelf", |t| {
            t.id_int("id", |x| &x.id, |x| &mut x.id);
            t.field("room", |x: &Shelf| &x.room, |x| &mut x.room);
        });
        schema.kind::<Book>("book", |t| {
            t.id_int("id", |x| &x.id, |x| &mut x.id);
            t.field("title", |x: &Book| &x.title, |x| &mut x.title);
            t.parent("shelf", |x: &Book| &x.shelf, |x| &mut x.shelf);
        });
        let reg = schema.seal().unwrap();
        let conv = ConverterRegistry::standard();

        let shelf_key = Key::new("shelf", 3);
        let book = Book {
            id: 11,
            title: "maps".into(),
            shelf: Ancestor::Key(shelf_key.clone()),
        };
        let descriptor = reg.descriptor_of::<Book>().unwrap().clone();
        let mut cx = EncodeCx::new(&reg, &conv, "book", true);
        let props = encode_object(&mut cx, &book, &descriptor, &Path::root(), 0, true).unwrap();
        let spec = cx.into_key_spec();
        assert_eq!(spec.parent_key(), Some(&shelf_key));
        // Parent linkage lives in the key, not the attributes
        assert!(props.at(&"shelf".parse().unwrap()).is_none());

        let stored_key = spec.to_key().unwrap();
        let cx = DecodeCx::new(&reg, &conv).with_key(&stored_key);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        let loaded = decoded.downcast_ref::<Book>().unwrap();
        // Without a loader the linkage stays a key
        assert_eq!(loaded.shelf.as_key(), stored_key.parent());
    }

    #[test]
    fn test_packed_subtree_round_trips() {
        #[derive(Default, Debug, PartialEq, Clone)]
        struct Point {
            x: i64,
            y: i64,
        }
        #[derive(Default, Debug, PartialEq)]
        struct Shape {
            id: i64,
            origin: Point,
        }
        let mut schema = SchemaBuilder::new();
        schema.kind::<Point>("point", |t| {
            t.field("x", |p: &Point| &p.x, |p| &mut p.x);
            t.field("y", |p: &Point| &p.y, |p| &mut p.y);
        });
        schema.kind::<Shape>("shape", |t| {
            t.id_int("id", |s| &s.id, |s| &mut s.id);
            t.embedded("origin", |s: &Shape| &s.origin, |s| &mut s.origin)
                .packed();
        });
        let reg = schema.seal().unwrap();
        let conv = ConverterRegistry::standard();
        let shape = Shape {
            id: 1,
            origin: Point { x: 4, y: -2 },
        };
        let descriptor = reg.descriptor_of::<Shape>().unwrap().clone();
        let mut cx = EncodeCx::new(&reg, &conv, "shape", true);
        let props = encode_object(&mut cx, &shape, &descriptor, &Path::root(), 0, true).unwrap();

        // The whole subtree is one blob attribute
        assert_eq!(props.len(), 1);
        assert_eq!(
            props.at(&"origin".parse().unwrap()).unwrap().value().kind(),
            DatumKind::Blob
        );

        let cx = DecodeCx::new(&reg, &conv);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.downcast_ref::<Shape>().unwrap().origin, shape.origin);
    }

    #[test]
    fn test_variant_field_round_trips() {
        use graft_core::schema::{SchemaError, VariantField};
        use std::any::{Any, TypeId};

        #[derive(Default, Debug, PartialEq, Clone)]
        struct Circle {
            radius: i64,
        }
        #[derive(Default, Debug, PartialEq, Clone)]
        struct Rect {
            w: i64,
            h: i64,
        }
        #[derive(Debug, PartialEq)]
        enum Outline {
            Circle(Circle),
            Rect(Rect),
        }
        impl Default for Outline {
            fn default() -> Self {
                Outline::Circle(Circle::default())
            }
        }
        impl VariantField for Outline {
            fn tag(&self) -> &'static str {
                match self {
                    Outline::Circle(_) => "circle",
                    Outline::Rect(_) => "rect",
                }
            }
            fn payload(&self) -> &dyn Any {
                match self {
                    Outline::Circle(c) => c,
                    Outline::Rect(r) => r,
                }
            }
            fn tags() -> &'static [&'static str] {
                &["circle", "rect"]
            }
            fn payload_type(tag: &str) -> Option<TypeId> {
                match tag {
                    "circle" => Some(TypeId::of::<Circle>()),
                    "rect" => Some(TypeId::of::<Rect>()),
                    _ => None,
                }
            }
            fn payload_name(tag: &str) -> Option<&'static str> {
                match tag {
                    "circle" => Some("Circle"),
                    "rect" => Some("Rect"),
                    _ => None,
                }
            }
            fn from_payload(tag: &str, payload: Box<dyn Any>) -> Result<Self, SchemaError> {
                match tag {
                    "circle" => payload
                        .downcast::<Circle>()
                        .map(|c| Outline::Circle(*c))
                        .map_err(|_| SchemaError::Downcast { expected: "Circle" }),
                    "rect" => payload
                        .downcast::<Rect>()
                        .map(|r| Outline::Rect(*r))
                        .map_err(|_| SchemaError::Downcast { expected: "Rect" }),
                    _ => Err(SchemaError::UnknownVariant {
                        tag: tag.to_string(),
                    }),
                }
            }
        }

        #[derive(Default, Debug)]
        struct Drawing {
            id: i64,
            outline: Outline,
        }

        let mut schema = SchemaBuilder::new();
        schema.kind::<Circle>("circle", |t| {
            t.field("radius", |c: &Circle| &c.radius, |c| &mut c.radius);
        });
        schema.kind::<Rect>("rect", |t| {
            t.field("w", |r: &Rect| &r.w, |r| &mut r.w);
            t.field("h", |r: &Rect| &r.h, |r| &mut r.h);
        });
        schema.kind::<Drawing>("drawing", |t| {
            t.id_int("id", |d| &d.id, |d| &mut d.id);
            t.variants("outline", |d: &Drawing| &d.outline, |d| &mut d.outline);
        });
        let reg = schema.seal().unwrap();
        let conv = ConverterRegistry::standard();

        let drawing = Drawing {
            id: 5,
            outline: Outline::Rect(Rect { w: 2, h: 6 }),
        };
        let descriptor = reg.descriptor_of::<Drawing>().unwrap().clone();
        let mut cx = EncodeCx::new(&reg, &conv, "drawing", true);
        let props =
            encode_object(&mut cx, &drawing, &descriptor, &Path::root(), 0, true).unwrap();

        let tag = props.at(&"outline.__variant".parse().unwrap()).unwrap();
        assert_eq!(*tag.value(), Datum::Text("rect".into()));

        let cx = DecodeCx::new(&reg, &conv);
        let decoded = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0)
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded.downcast_ref::<Drawing>().unwrap().outline,
            Outline::Rect(Rect { w: 2, h: 6 })
        );
    }

    #[test]
    fn test_missing_discriminator_rejected() {
        // Reuse the drawing registry shape through a minimal local setup
        #[derive(Default, Debug, PartialEq, Clone)]
        struct Solo {
            n: i64,
        }
        #[derive(Debug, PartialEq)]
        enum OneOf {
            Solo(Solo),
        }
        impl Default for OneOf {
            fn default() -> Self {
                OneOf::Solo(Solo::default())
            }
        }
        impl graft_core::schema::VariantField for OneOf {
            fn tag(&self) -> &'static str {
                "solo"
            }
            fn payload(&self) -> &dyn std::any::Any {
                match self {
                    OneOf::Solo(s) => s,
                }
            }
            fn tags() -> &'static [&'static str] {
                &["solo"]
            }
            fn payload_type(tag: &str) -> Option<std::any::TypeId> {
                (tag == "solo").then(|| std::any::TypeId::of::<Solo>())
            }
            fn payload_name(tag: &str) -> Option<&'static str> {
                (tag == "solo").then_some("Solo")
            }
            fn from_payload(
                tag: &str,
                payload: Box<dyn std::any::Any>,
            ) -> Result<Self, graft_core::schema::SchemaError> {
                let _ = tag;
                payload
                    .downcast::<Solo>()
                    .map(|s| OneOf::Solo(*s))
                    .map_err(|_| graft_core::schema::SchemaError::Downcast { expected: "Solo" })
            }
        }
        #[derive(Default)]
        struct Holder {
            choice: OneOf,
        }
        let mut schema = SchemaBuilder::new();
        schema.kind::<Solo>("solo", |t| {
            t.field("n", |s: &Solo| &s.n, |s| &mut s.n);
        });
        schema.kind::<Holder>("holder", |t| {
            t.variants("choice", |h: &Holder| &h.choice, |h| &mut h.choice);
        });
        let reg = schema.seal().unwrap();
        let conv = ConverterRegistry::new();

        let mut props = PropertySet::new();
        props
            .insert(Property::new("choice.n".parse().unwrap(), Datum::Int(1), true))
            .unwrap();
        let descriptor = reg.descriptor_of::<Holder>().unwrap().clone();
        let cx = DecodeCx::new(&reg, &conv);
        let err = decode_object(&cx, props.view(), &descriptor, &Path::root(), 0).unwrap_err();
        assert!(matches!(err, DecodeError::MissingDiscriminator { .. }));
    }
}
