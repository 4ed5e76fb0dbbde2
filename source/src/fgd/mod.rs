// Entity schema registry.
//
// Entity classes in the engine's FGD tooling compose dozens of capability
// bases with overlapping fields. Here each capability is a plain parse
// function over the raw key-value block; a class is an ordered list of
// them, and the class's attribute set is the ordered merge of their
// output. Merge precedence is the declaration order of the list, last
// writer wins.

pub mod classes;
pub mod mixins;

use ahash::AHashMap;
use glam::Vec3;

use crate::bsp::entities::RawEntity;
use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Vec3(Vec3),
    /// Whitespace-separated integer channels; 3 for RGB, 4 when a
    /// brightness term rides along.
    Color(Vec<i32>),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrSet {
    values: AHashMap<String, AttrValue>,
}

impl AttrSet {
    pub fn set(&mut self, key: &str, value: AttrValue) {
        self.values.insert(key.to_owned(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub type MixinFn = fn(&RawEntity, &mut AttrSet, &mut Vec<SourceError>);

/// One capability base: a named, pure parse pass over the raw pairs.
#[derive(Copy, Clone)]
pub struct Mixin {
    pub name: &'static str,
    pub parse: MixinFn,
}

/// Owns the per-decode counter used to name entities that carry no
/// targetname. Each decode passes its own session, so concurrent decodes
/// never share numbering state.
#[derive(Debug, Default)]
pub struct DecodeSession {
    next_id: u64,
}

impl DecodeSession {
    fn next_entity_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub classname: String,
    /// The targetname, or `entity_<n>` numbered by the decode session.
    pub id: String,
    /// Every pair as it appeared in the map, unknown keys included.
    pub raw: RawEntity,
    /// Typed attributes contributed by the registered mixins; empty for
    /// classes the registry does not know.
    pub attrs: AttrSet,
}

#[derive(Default)]
pub struct SchemaRegistry {
    classes: AHashMap<String, Vec<Mixin>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, classname: &str, mixins: Vec<Mixin>) {
        self.classes.insert(classname.to_ascii_lowercase(), mixins);
    }

    pub fn mixins_for(&self, classname: &str) -> Option<&[Mixin]> {
        self.classes
            .get(&classname.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn parse_entities(
        &self,
        session: &mut DecodeSession,
        raw_entities: Vec<RawEntity>,
        diagnostics: &mut Vec<SourceError>,
    ) -> Vec<EntityRecord> {
        raw_entities
            .into_iter()
            .map(|raw| self.parse_entity(session, raw, diagnostics))
            .collect()
    }

    pub fn parse_entity(
        &self,
        session: &mut DecodeSession,
        raw: RawEntity,
        diagnostics: &mut Vec<SourceError>,
    ) -> EntityRecord {
        let classname = raw.classname().unwrap_or_default().to_owned();
        if classname.is_empty() {
            diagnostics.push(SourceError::InvalidEncoding {
                file: "bsp",
                what: "entity without a classname".to_owned(),
            });
        }

        let mut attrs = AttrSet::default();
        if let Some(mixins) = self.mixins_for(&classname) {
            for mixin in mixins {
                (mixin.parse)(&raw, &mut attrs, diagnostics);
            }
        }

        let id = match raw.get("targetname") {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("entity_{}", session.next_entity_id()),
        };

        EntityRecord {
            classname,
            id,
            raw,
            attrs,
        }
    }
}

/// The format is untyped text; the convention is float when a `.` is
/// present, integer otherwise.
pub fn parse_number(value: &str) -> Option<AttrValue> {
    if value.contains('.') {
        value.trim().parse::<f32>().ok().map(AttrValue::Float)
    } else {
        value.trim().parse::<i32>().ok().map(AttrValue::Int)
    }
}

/// Whitespace-split component floats; a wrong component count is an error,
/// never a silent zero-fill.
pub fn parse_vec3(value: &str) -> Result<Vec3, SourceError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(SourceError::InvalidEncoding {
            file: "bsp",
            what: format!("vector \"{}\" has {} components", value, parts.len()),
        });
    }
    let mut out = [0.0f32; 3];
    for (i, part) in parts.iter().enumerate() {
        out[i] = part.parse().map_err(|_| SourceError::InvalidEncoding {
            file: "bsp",
            what: format!("vector component \"{}\"", part),
        })?;
    }
    Ok(Vec3::from_array(out))
}

pub fn parse_color(value: &str) -> Result<Vec<i32>, SourceError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(SourceError::InvalidEncoding {
            file: "bsp",
            what: format!("color \"{}\" has {} components", value, parts.len()),
        });
    }
    parts
        .iter()
        .map(|p| {
            p.parse().map_err(|_| SourceError::InvalidEncoding {
                file: "bsp",
                what: format!("color component \"{}\"", p),
            })
        })
        .collect()
}

pub fn parse_bool(value: &str) -> bool {
    value == "1"
}

#[cfg(test)]
mod fgd_tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawEntity {
        RawEntity {
            pairs: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn light_entity_resolves_typed_attributes() {
        let registry = SchemaRegistry::standard();
        let mut session = DecodeSession::default();
        let mut diagnostics = Vec::new();
        let entity = registry.parse_entity(
            &mut session,
            raw(&[
                ("classname", "light"),
                ("origin", "1 2 3"),
                ("_light", "255 0 0 200"),
            ]),
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty());
        assert_eq!(
            entity.attrs.get("origin"),
            Some(&AttrValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(
            entity.attrs.get("_light"),
            Some(&AttrValue::Color(vec![255, 0, 0, 200]))
        );
    }

    #[test]
    fn unknown_keys_survive_verbatim() {
        let registry = SchemaRegistry::standard();
        let mut session = DecodeSession::default();
        let mut diagnostics = Vec::new();
        let entity = registry.parse_entity(
            &mut session,
            raw(&[
                ("classname", "light"),
                ("origin", "0 0 0"),
                ("_quadratic_attn", "1"),
                ("custom_editor_key", "whatever"),
            ]),
            &mut diagnostics,
        );
        assert_eq!(entity.raw.get("custom_editor_key"), Some("whatever"));
        assert_eq!(entity.raw.get("_quadratic_attn"), Some("1"));
        assert_eq!(entity.raw.pairs.len(), 4);
    }

    #[test]
    fn unnamed_entities_number_from_the_session() {
        let registry = SchemaRegistry::standard();
        let mut session = DecodeSession::default();
        let mut diagnostics = Vec::new();
        let a = registry.parse_entity(&mut session, raw(&[("classname", "light")]), &mut diagnostics);
        let b = registry.parse_entity(&mut session, raw(&[("classname", "light")]), &mut diagnostics);
        assert_eq!(a.id, "entity_0");
        assert_eq!(b.id, "entity_1");

        // a fresh session restarts the numbering: no process-wide state
        let mut other = DecodeSession::default();
        let c = registry.parse_entity(&mut other, raw(&[("classname", "light")]), &mut diagnostics);
        assert_eq!(c.id, "entity_0");
    }

    #[test]
    fn merge_order_last_writer_wins() {
        fn set_origin_a(_: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
            attrs.set("origin", AttrValue::Str("a".to_owned()));
        }
        fn set_origin_b(_: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
            attrs.set("origin", AttrValue::Str("b".to_owned()));
        }
        const A: Mixin = Mixin {
            name: "A",
            parse: set_origin_a,
        };
        const B: Mixin = Mixin {
            name: "B",
            parse: set_origin_b,
        };

        let mut registry = SchemaRegistry::new();
        registry.register("test_ab", vec![A, B]);
        registry.register("test_ba", vec![B, A]);

        let mut session = DecodeSession::default();
        let mut diagnostics = Vec::new();
        let ab = registry.parse_entity(&mut session, raw(&[("classname", "test_ab")]), &mut diagnostics);
        let ba = registry.parse_entity(&mut session, raw(&[("classname", "test_ba")]), &mut diagnostics);
        assert_eq!(ab.attrs.get("origin"), Some(&AttrValue::Str("b".to_owned())));
        assert_eq!(ba.attrs.get("origin"), Some(&AttrValue::Str("a".to_owned())));
    }

    #[test]
    fn malformed_vector_is_an_error_not_a_zero_fill() {
        let registry = SchemaRegistry::standard();
        let mut session = DecodeSession::default();
        let mut diagnostics = Vec::new();
        let entity = registry.parse_entity(
            &mut session,
            raw(&[("classname", "light"), ("origin", "1 2")]),
            &mut diagnostics,
        );
        assert_eq!(entity.attrs.get("origin"), None);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn numbers_split_on_the_decimal_point() {
        assert_eq!(parse_number("12"), Some(AttrValue::Int(12)));
        assert_eq!(parse_number("12.5"), Some(AttrValue::Float(12.5)));
        assert_eq!(parse_number("x"), None);
    }
}
