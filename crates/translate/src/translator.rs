//! Translator variants and the value-level dispatch
//!
//! Every registered field resolves to one [`Translator`] variant derived
//! from its shape and policy. Encode and decode both run through a single
//! dispatch function per direction, so composition is explicit: `Packed`
//! wraps another variant, everything else is a leaf.
//!
//! | Variant      | Storage form                                          |
//! |--------------|-------------------------------------------------------|
//! | Scalar       | one attribute at the field path                       |
//! | ScalarList   | one list attribute at the field path                  |
//! | Embedded     | child attributes under the field path                 |
//! | Collapsed    | the target's only field, stored at the field path     |
//! | EmbeddedList | one list attribute per leaf path (parallel columns)   |
//! | EmbeddedMap  | child attributes under path + map key                 |
//! | Variant      | payload attributes plus a `__variant` discriminator   |
//! | KeyId        | no attributes; feeds the key spec                     |
//! | Parent       | no attributes; feeds the key spec                     |
//! | Packed       | the wrapped form, serialized into one blob attribute  |

use crate::context::{DecodeCx, EncodeCx, ParentHold};
use crate::error::{DecodeError, EncodeError};
use graft_core::datum::{Datum, DatumKind};
use graft_core::path::Path;
use graft_core::property::{Property, PropertySet, PropsView};
use graft_core::schema::{
    AncestorRead, AncestorWrite, FieldDescriptor, FieldRead, FieldShape, FieldWrite, SchemaError,
    VariantTable, VARIANT_TAG,
};
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serialized row of a packed subtree: relative path, value, indexed flag
type PackedRow = (String, Datum, bool);

/// How one field moves between its value and its attributes
#[derive(Debug, Clone)]
pub enum Translator {
    /// Single scalar attribute
    Scalar {
        /// The field's natural kind
        natural: DatumKind,
        /// Storage kind override from policy
        store_as: Option<DatumKind>,
    },
    /// One list attribute of scalars
    ScalarList {
        /// The element's natural kind
        natural: DatumKind,
        /// Storage kind override for elements
        store_as: Option<DatumKind>,
    },
    /// Nested object under the field path
    Embedded {
        /// Target type
        target: TypeId,
        /// Target name for diagnostics
        target_name: &'static str,
    },
    /// Single-field object stored at the field path itself
    Collapsed {
        /// Target type
        target: TypeId,
        /// Target name for diagnostics
        target_name: &'static str,
    },
    /// Object list as parallel list columns
    EmbeddedList {
        /// Element type
        target: TypeId,
        /// Element name for diagnostics
        target_name: &'static str,
    },
    /// String-keyed objects one segment below the field path
    EmbeddedMap {
        /// Value type
        target: TypeId,
        /// Value name for diagnostics
        target_name: &'static str,
    },
    /// Tag-dispatched polymorphic object
    Variant {
        /// The enum's dispatch table
        table: Arc<VariantTable>,
    },
    /// Key id component; produces no attributes
    KeyId,
    /// Parent component; produces no attributes
    Parent {
        /// Parent type
        target: TypeId,
        /// Remaining-activation override from policy
        activation: Option<usize>,
    },
    /// Wrapped form serialized into a single blob attribute
    Packed {
        /// The translator whose output is packed
        inner: Box<Translator>,
    },
}

/// Resolve a field's translator from its shape and policy
pub fn resolve(field: &FieldDescriptor) -> Translator {
    let policy = field.policy();
    let base = match field.shape() {
        FieldShape::Scalar { kind, .. } => Translator::Scalar {
            natural: *kind,
            store_as: policy.store_as,
        },
        FieldShape::ScalarList { kind } => Translator::ScalarList {
            natural: *kind,
            store_as: policy.store_as,
        },
        FieldShape::Embedded {
            target,
            target_name,
            ..
        } => {
            if policy.collapse {
                Translator::Collapsed {
                    target: *target,
                    target_name,
                }
            } else {
                Translator::Embedded {
                    target: *target,
                    target_name,
                }
            }
        }
        FieldShape::EmbeddedList {
            target,
            target_name,
        } => Translator::EmbeddedList {
            target: *target,
            target_name,
        },
        FieldShape::EmbeddedMap {
            target,
            target_name,
        } => Translator::EmbeddedMap {
            target: *target,
            target_name,
        },
        FieldShape::Variant { table } => Translator::Variant {
            table: Arc::clone(table),
        },
        FieldShape::KeyId { .. } => Translator::KeyId,
        FieldShape::Parent { target, .. } => Translator::Parent {
            target: *target,
            activation: policy.activation,
        },
    };
    if policy.packed {
        Translator::Packed {
            inner: Box::new(base),
        }
    } else {
        base
    }
}

fn emit_null(
    cx: &EncodeCx<'_>,
    out: &mut PropertySet,
    path: &Path,
    indexed: bool,
) -> Result<(), EncodeError> {
    if cx.store_nulls() {
        out.insert(Property::new(path.clone(), Datum::Null, indexed))?;
    }
    Ok(())
}

fn shape_mismatch() -> EncodeError {
    EncodeError::Schema(SchemaError::WrongWrite {
        expected: "a value matching the field's registered shape",
    })
}

// ============================================================================
// Encode dispatch
// ============================================================================

/// Flatten one field value into the accumulator
///
/// `indexed` is the effective flag (enclosing flag AND field policy);
/// `root` is true only for the outermost object, where key and parent
/// fields feed the key spec.
#[allow(clippy::too_many_arguments)]
pub fn encode_value(
    cx: &mut EncodeCx<'_>,
    translator: &Translator,
    read: FieldRead<'_>,
    path: &Path,
    depth: usize,
    indexed: bool,
    root: bool,
    out: &mut PropertySet,
) -> Result<(), EncodeError> {
    match (translator, read) {
        (Translator::Scalar { natural, store_as }, FieldRead::Scalar(value)) => {
            match value {
                None => emit_null(cx, out, path, indexed),
                Some(datum) => {
                    let target = store_as.unwrap_or(*natural);
                    let stored = cx
                        .converters()
                        .convert(datum, target)
                        .map_err(|source| EncodeError::Conversion {
                            path: path.clone(),
                            source,
                        })?;
                    if stored.is_null() {
                        emit_null(cx, out, path, indexed)
                    } else {
                        out.insert(Property::new(path.clone(), stored, indexed))?;
                        Ok(())
                    }
                }
            }
        }

        (Translator::ScalarList { natural, store_as }, FieldRead::ScalarList(items)) => {
            if items.is_empty() {
                return Ok(());
            }
            let target = store_as.unwrap_or(*natural);
            let mut stored = Vec::with_capacity(items.len());
            for item in items {
                let converted = cx.converters().convert(item, target).map_err(|source| {
                    EncodeError::Conversion {
                        path: path.clone(),
                        source,
                    }
                })?;
                if !converted.is_null() {
                    stored.push(converted);
                }
            }
            out.insert(Property::new(path.clone(), Datum::List(stored), indexed))?;
            Ok(())
        }

        (
            Translator::Embedded {
                target,
                target_name,
            },
            FieldRead::Embedded(value),
        ) => match value {
            None => emit_null(cx, out, path, indexed),
            Some(instance) => {
                let descriptor = cx.registry().descriptor_by_id(*target, target_name)?;
                let sub = crate::object::encode_object(
                    cx,
                    instance,
                    descriptor,
                    path,
                    depth + 1,
                    indexed,
                )?;
                out.merge(sub)?;
                Ok(())
            }
        },

        (
            Translator::Collapsed {
                target,
                target_name,
            },
            FieldRead::Embedded(value),
        ) => match value {
            None => emit_null(cx, out, path, indexed),
            Some(instance) => {
                let descriptor = cx.registry().descriptor_by_id(*target, target_name)?;
                let sub = crate::object::encode_object(
                    cx,
                    instance,
                    descriptor,
                    path,
                    depth + 1,
                    indexed,
                )?;
                let mut items = sub.into_vec();
                match items.len() {
                    0 => Ok(()),
                    1 => {
                        let only = items.pop().map(|p| p.with_path(path.clone()));
                        if let Some(p) = only {
                            out.insert(p)?;
                        }
                        Ok(())
                    }
                    _ => Err(EncodeError::CollapsedSpread { path: path.clone() }),
                }
            }
        },

        (
            Translator::EmbeddedList {
                target,
                target_name,
            },
            FieldRead::EmbeddedList(items),
        ) => {
            if items.is_empty() {
                return Ok(());
            }
            let descriptor = cx.registry().descriptor_by_id(*target, target_name)?;
            let count = items.len();
            let mut columns: BTreeMap<Path, (Vec<Datum>, bool)> = BTreeMap::new();
            for (i, instance) in items.into_iter().enumerate() {
                let sub = crate::object::encode_object(
                    cx,
                    instance,
                    descriptor,
                    path,
                    depth + 1,
                    indexed,
                )?;
                for prop in sub {
                    let (prop_path, value, prop_indexed) = prop.into_parts();
                    if matches!(value, Datum::List(_)) {
                        return Err(EncodeError::NestedList { path: prop_path });
                    }
                    let (column, _) = columns
                        .entry(prop_path)
                        .or_insert_with(|| (Vec::new(), prop_indexed));
                    while column.len() < i {
                        column.push(Datum::Null);
                    }
                    column.push(value);
                }
            }
            for (column_path, (mut column, column_indexed)) in columns {
                while column.len() < count {
                    column.push(Datum::Null);
                }
                out.insert(Property::new(
                    column_path,
                    Datum::List(column),
                    column_indexed,
                ))?;
            }
            Ok(())
        }

        (
            Translator::EmbeddedMap {
                target,
                target_name,
            },
            FieldRead::EmbeddedMap(entries),
        ) => {
            let descriptor = cx.registry().descriptor_by_id(*target, target_name)?;
            for (map_key, instance) in entries {
                if map_key.is_empty() || map_key.contains('.') || map_key.starts_with("__") {
                    return Err(EncodeError::BadMapKey {
                        path: path.clone(),
                        key: map_key.to_string(),
                    });
                }
                let entry_path = path.clone().child(map_key);
                let sub = crate::object::encode_object(
                    cx,
                    instance,
                    descriptor,
                    &entry_path,
                    depth + 1,
                    indexed,
                )?;
                out.merge(sub)?;
            }
            Ok(())
        }

        (Translator::Variant { table }, FieldRead::Variant(tag, payload)) => {
            let target = (table.payload_type)(tag).ok_or(SchemaError::UnknownVariant {
                tag: tag.to_string(),
            })?;
            let target_name = (table.payload_name)(tag).unwrap_or("variant payload");
            let descriptor = cx.registry().descriptor_by_id(target, target_name)?;
            let sub =
                crate::object::encode_object(cx, payload, descriptor, path, depth + 1, indexed)?;
            out.merge(sub)?;
            out.insert(Property::new(
                path.clone().child(VARIANT_TAG),
                Datum::Text(tag.to_string()),
                indexed,
            ))?;
            Ok(())
        }

        (Translator::KeyId, FieldRead::KeyId(id)) => {
            if root && !id.is_unset() {
                cx.key_mut().set_id(id)?;
            }
            Ok(())
        }

        (Translator::Parent { .. }, FieldRead::Parent(ancestor)) => {
            if root {
                match ancestor {
                    AncestorRead::None => {}
                    AncestorRead::Key(key) => {
                        cx.key_mut().set_parent(ParentHold::Resolved(key.clone()))?;
                    }
                    AncestorRead::Instance { .. } => {
                        cx.key_mut().set_parent(ParentHold::Pending)?;
                    }
                }
            }
            Ok(())
        }

        (Translator::Packed { inner }, read) => {
            let mut scratch = PropertySet::new();
            encode_value(cx, inner, read, path, depth, indexed, root, &mut scratch)?;
            if scratch.is_empty() {
                return Ok(());
            }
            let rows: Vec<PackedRow> = scratch
                .into_vec()
                .into_iter()
                .map(|prop| {
                    let (prop_path, value, prop_indexed) = prop.into_parts();
                    let rel = prop_path
                        .strip_prefix(path)
                        .map(|p| p.to_string())
                        .unwrap_or_default();
                    (rel, value, prop_indexed)
                })
                .collect();
            let bytes = rmp_serde::to_vec(&rows).map_err(|source| EncodeError::Pack {
                path: path.clone(),
                source,
            })?;
            out.insert(Property::new(path.clone(), Datum::Blob(bytes), indexed))?;
            Ok(())
        }

        _ => Err(shape_mismatch()),
    }
}

// ============================================================================
// Decode dispatch
// ============================================================================

/// Rebuild one field value from its slice of attributes
pub fn decode_value(
    cx: &DecodeCx<'_>,
    translator: &Translator,
    props: PropsView<'_>,
    path: &Path,
    depth: usize,
    root: bool,
) -> Result<FieldWrite, DecodeError> {
    match translator {
        Translator::Scalar { natural, .. } => match props.at(path) {
            None => Ok(FieldWrite::Null),
            Some(prop) => {
                let stored = prop.value().clone();
                if stored.is_null() {
                    return Ok(FieldWrite::Null);
                }
                let converted = cx.converters().convert(stored, *natural).map_err(|source| {
                    DecodeError::Conversion {
                        path: path.clone(),
                        source,
                    }
                })?;
                if converted.is_null() {
                    Ok(FieldWrite::Null)
                } else {
                    Ok(FieldWrite::Scalar(converted))
                }
            }
        },

        Translator::ScalarList { natural, .. } => match props.at(path) {
            None => Ok(FieldWrite::ScalarList(Vec::new())),
            Some(prop) => {
                let stored: Vec<Datum> = match prop.value() {
                    Datum::Null => Vec::new(),
                    Datum::List(items) => items.clone(),
                    single => vec![single.clone()],
                };
                let mut values = Vec::with_capacity(stored.len());
                for item in stored {
                    if item.is_null() {
                        continue;
                    }
                    let converted =
                        cx.converters().convert(item, *natural).map_err(|source| {
                            DecodeError::Conversion {
                                path: path.clone(),
                                source,
                            }
                        })?;
                    if !converted.is_null() {
                        values.push(converted);
                    }
                }
                Ok(FieldWrite::ScalarList(values))
            }
        },

        Translator::Embedded {
            target,
            target_name,
        } => {
            if props.is_empty() {
                return Ok(FieldWrite::Null);
            }
            let descriptor = lookup(cx, *target, target_name, path)?;
            match crate::object::decode_object(cx, props, &descriptor, path, depth + 1)? {
                Some(instance) => Ok(FieldWrite::Embedded(instance)),
                None => Ok(FieldWrite::Null),
            }
        }

        Translator::Collapsed {
            target,
            target_name,
        } => {
            let prop = match props.at(path) {
                None => return Ok(FieldWrite::Null),
                Some(p) => p,
            };
            if prop.value().is_null() {
                return Ok(FieldWrite::Null);
            }
            let descriptor = lookup(cx, *target, target_name, path)?;
            let inner_field = match descriptor.fields().first() {
                Some(f) => f,
                None => return Err(DecodeError::WrongShape { path: path.clone() }),
            };
            let inner_translator = resolve(inner_field);
            let inner_path = path.clone().child(inner_field.name());
            let rerooted = PropertySet::singleton(
                Property::new(inner_path.clone(), prop.value().clone(), prop.indexed()),
            );
            let write = decode_value(
                cx,
                &inner_translator,
                rerooted.view(),
                &inner_path,
                depth + 1,
                false,
            )?;
            let mut instance = descriptor.construct();
            inner_field
                .write(instance.as_mut(), write)
                .map_err(|source| DecodeError::Schema {
                    path: path.clone(),
                    source,
                })?;
            Ok(FieldWrite::Embedded(instance))
        }

        Translator::EmbeddedList {
            target,
            target_name,
        } => {
            if props.is_empty() {
                return Ok(FieldWrite::EmbeddedList(Vec::new()));
            }
            let descriptor = lookup(cx, *target, target_name, path)?;
            let count = props
                .iter()
                .map(|prop| match prop.value() {
                    Datum::List(items) => items.len(),
                    _ => 1,
                })
                .max()
                .unwrap_or(0);
            let mut decoded = Vec::with_capacity(count);
            for i in 0..count {
                let mut element_props = Vec::new();
                for prop in props.iter() {
                    let item = match prop.value() {
                        Datum::List(items) => items.get(i).cloned(),
                        single if i == 0 => Some(single.clone()),
                        _ => None,
                    };
                    if let Some(item) = item {
                        if !item.is_null() {
                            element_props.push(Property::new(
                                prop.path().clone(),
                                item,
                                prop.indexed(),
                            ));
                        }
                    }
                }
                let element_set = PropertySet::from_vec(element_props)
                    .map_err(|_| DecodeError::WrongShape { path: path.clone() })?;
                let element =
                    crate::object::decode_object(cx, element_set.view(), &descriptor, path, depth + 1)?
                        .unwrap_or_else(|| descriptor.construct());
                decoded.push(element);
            }
            Ok(FieldWrite::EmbeddedList(decoded))
        }

        Translator::EmbeddedMap {
            target,
            target_name,
        } => {
            let descriptor = lookup(cx, *target, target_name, path)?;
            let mut entries = Vec::new();
            for group in props.group_by_prefix(path) {
                let map_key = match group.prefix.last() {
                    Some(segment) => segment.to_string(),
                    None => continue,
                };
                if group.props.is_null_marker(&group.prefix) {
                    continue;
                }
                if let Some(value) = crate::object::decode_object(
                    cx,
                    group.props,
                    &descriptor,
                    &group.prefix,
                    depth + 1,
                )? {
                    entries.push((map_key, value));
                }
            }
            Ok(FieldWrite::EmbeddedMap(entries))
        }

        Translator::Variant { table } => {
            let tag_path = path.clone().child(VARIANT_TAG);
            let tag = match props.at(&tag_path) {
                None => return Err(DecodeError::MissingDiscriminator { path: path.clone() }),
                Some(prop) => match prop.value() {
                    Datum::Text(tag) => tag.clone(),
                    _ => return Err(DecodeError::WrongShape { path: tag_path }),
                },
            };
            let target = (table.payload_type)(&tag).ok_or_else(|| DecodeError::Schema {
                path: path.clone(),
                source: SchemaError::UnknownVariant { tag: tag.clone() },
            })?;
            let target_name = (table.payload_name)(&tag).unwrap_or("variant payload");
            let descriptor = lookup(cx, target, target_name, path)?;

            let payload_props: Vec<Property> = props
                .iter()
                .filter(|prop| *prop.path() != tag_path)
                .cloned()
                .collect();
            let payload_set = PropertySet::from_vec(payload_props)
                .map_err(|_| DecodeError::WrongShape { path: path.clone() })?;
            let payload =
                crate::object::decode_object(cx, payload_set.view(), &descriptor, path, depth + 1)?
                    .unwrap_or_else(|| descriptor.construct());
            let built = (table.build)(&tag, payload).map_err(|source| DecodeError::Schema {
                path: path.clone(),
                source,
            })?;
            Ok(FieldWrite::Variant(built))
        }

        Translator::KeyId => match cx.key() {
            Some(key) if root => Ok(FieldWrite::KeyId(key.id().clone())),
            _ => Ok(FieldWrite::Null),
        },

        Translator::Parent { target, activation } => {
            let parent_key = match cx.key().and_then(|k| k.parent()) {
                Some(k) if root => k,
                _ => return Ok(FieldWrite::Parent(AncestorWrite::None)),
            };
            let budget = cx.depth_budget().min(activation.unwrap_or(usize::MAX));
            if budget == 0 {
                return Ok(FieldWrite::Parent(AncestorWrite::Key(parent_key.clone())));
            }
            match cx.loader() {
                None => Ok(FieldWrite::Parent(AncestorWrite::Key(parent_key.clone()))),
                Some(loader) => {
                    match loader.load_parent(parent_key, *target, budget - 1)? {
                        Some(instance) => {
                            Ok(FieldWrite::Parent(AncestorWrite::Instance(instance)))
                        }
                        // The referenced record is gone; keep the linkage as a key
                        None => Ok(FieldWrite::Parent(AncestorWrite::Key(parent_key.clone()))),
                    }
                }
            }
        }

        Translator::Packed { inner } => {
            let prop = match props.at(path) {
                None => return decode_value(cx, inner, PropsView::empty(), path, depth, root),
                Some(p) => p,
            };
            let bytes = match prop.value() {
                Datum::Blob(bytes) => bytes,
                Datum::Null => {
                    return decode_value(cx, inner, PropsView::empty(), path, depth, root)
                }
                _ => return Err(DecodeError::WrongShape { path: path.clone() }),
            };
            let rows: Vec<PackedRow> =
                rmp_serde::from_slice(bytes).map_err(|source| DecodeError::Unpack {
                    path: path.clone(),
                    source,
                })?;
            let mut unpacked = Vec::with_capacity(rows.len());
            for (rel, value, row_indexed) in rows {
                let absolute = if rel.is_empty() {
                    path.clone()
                } else {
                    let rel_path: Path =
                        rel.parse().map_err(|_| DecodeError::PackedPath {
                            path: path.clone(),
                            inner: rel.clone(),
                        })?;
                    path.join(&rel_path)
                };
                unpacked.push(Property::new(absolute, value, row_indexed));
            }
            let set = PropertySet::from_vec(unpacked)
                .map_err(|_| DecodeError::WrongShape { path: path.clone() })?;
            decode_value(cx, inner, set.view(), path, depth, root)
        }
    }
}

fn lookup(
    cx: &DecodeCx<'_>,
    target: TypeId,
    target_name: &'static str,
    path: &Path,
) -> Result<Arc<graft_core::schema::TypeDescriptor>, DecodeError> {
    cx.registry()
        .descriptor_by_id(target, target_name)
        .map(Arc::clone)
        .map_err(|source| DecodeError::Schema {
            path: path.clone(),
            source,
        })
}
