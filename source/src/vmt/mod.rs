// Compiled material interpretation: shader name plus a flat parameter
// block, resolved into typed slots for the scene builder. No per-shader
// node wiring happens here; this layer only normalizes what the material
// declares and fetches the textures it references.

pub mod keyvalues;

use ahash::AHashMap;

use common::vpath::VLocalPath;

use crate::error::{Result, SourceError};
use crate::game_data::GameData;
use crate::vtf::DecodedTexture;

pub use self::keyvalues::{KvBlock, KvEntry};

/// Flat color substituted when a referenced texture is missing from every
/// mounted root. Missing textures are routine in partial asset sets, so
/// this is a warning, never a failure.
pub const MISSING_TEXTURE_COLOR: [u8; 4] = [77, 0, 77, 255];

/// A parsed material: shader block name and its parameters, still as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Vmt {
    pub block: KvBlock,
}

impl Vmt {
    pub fn read(data: &[u8]) -> Result<Vmt> {
        let text = std::str::from_utf8(data).map_err(|_| SourceError::InvalidEncoding {
            file: "vmt",
            what: "material is not valid utf-8".to_owned(),
        })?;
        Ok(Vmt {
            block: keyvalues::parse_block(text, "vmt")?,
        })
    }

    pub fn shader(&self) -> &str {
        &self.block.name
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.block.get(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub path: String,
    /// Decoded pixels, or `None` when the file was absent and the consumer
    /// should fall back to [`MISSING_TEXTURE_COLOR`].
    pub texture: Option<DecodedTexture>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialValue {
    Texture(TextureSlot),
    Color([u8; 4]),
    Scalar(f32),
    Int(i32),
    Bool(bool),
    Text(String),
}

/// Shader name plus typed parameter slots, with the raw pairs retained for
/// parameters this layer does not recognize.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParameterSet {
    pub shader: String,
    pub params: AHashMap<String, MaterialValue>,
    pub raw: Vec<(String, String)>,
}

const TEXTURE_KEYS: &[&str] = &[
    "$basetexture",
    "$texture2",
    "$bumpmap",
    "$normalmap",
    "$envmap",
    "$detail",
    "$selfillummask",
];

const BOOL_KEYS: &[&str] = &[
    "$additive",
    "$translucent",
    "$alphatest",
    "$nocull",
    "$selfillum",
    "$vertexcolor",
    "$vertexalpha",
    "$ignorez",
    "$nofog",
];

const COLOR_KEYS: &[&str] = &["$color", "$color2", "$envmaptint", "$selfillumtint"];

impl MaterialParameterSet {
    /// Resolve a material's parameter block. When `content` is given,
    /// texture slots are loaded and decoded through it; `$envmap` special
    /// names (`env_cubemap`) and missing files leave the slot undecoded.
    pub fn resolve(vmt: &Vmt, content: Option<&GameData>) -> MaterialParameterSet {
        let mut params = AHashMap::new();
        let mut raw = Vec::new();

        for (key, entry) in &vmt.block.entries {
            let KvEntry::Value(value) = entry else {
                continue; // proxy blocks and fallbacks are not parameters
            };
            raw.push((key.clone(), value.clone()));
            let key = key.to_ascii_lowercase();

            let resolved = if TEXTURE_KEYS.contains(&key.as_str()) {
                resolve_texture(value, content)
            } else if BOOL_KEYS.contains(&key.as_str()) {
                MaterialValue::Bool(value == "1")
            } else if COLOR_KEYS.contains(&key.as_str()) {
                match parse_color(value) {
                    Some(color) => MaterialValue::Color(color),
                    None => MaterialValue::Text(value.clone()),
                }
            } else {
                parse_untyped(value)
            };
            params.insert(key, resolved);
        }

        MaterialParameterSet {
            shader: vmt.shader().to_owned(),
            params,
            raw,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MaterialValue> {
        self.params.get(&key.to_ascii_lowercase())
    }
}

fn resolve_texture(path: &str, content: Option<&GameData>) -> MaterialValue {
    let normalized = path.to_ascii_lowercase().replace('\\', "/");
    let texture = content.and_then(|game| {
        let file = VLocalPath::new("materials", &normalized, "vtf");
        match game.load_vtf(&file) {
            Ok(vtf) => match vtf.decode() {
                Ok(tex) => Some(tex),
                Err(err) => {
                    log::warn!("texture {} failed to decode: {}", normalized, err);
                    None
                }
            },
            Err(err) => {
                log::warn!("texture {}: {}", normalized, err);
                None
            }
        }
    });
    MaterialValue::Texture(TextureSlot {
        path: normalized,
        texture,
    })
}

/// Colors come as `{255 128 0}` byte triples or `[1 .5 0]` float triples,
/// with an optional fourth component.
fn parse_color(value: &str) -> Option<[u8; 4]> {
    let trimmed = value.trim();
    let (body, float) = if let Some(b) = trimmed.strip_prefix('{') {
        (b.strip_suffix('}')?, false)
    } else if let Some(b) = trimmed.strip_prefix('[') {
        (b.strip_suffix(']')?, true)
    } else {
        return None;
    };
    let parts: Vec<&str> = body.split_whitespace().collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let mut out = [255u8; 4];
    for (i, part) in parts.iter().enumerate() {
        out[i] = if float {
            (part.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8
        } else {
            part.parse::<i32>().ok()?.clamp(0, 255) as u8
        };
    }
    Some(out)
}

/// The source format is untyped text: numbers with a `.` are floats,
/// other digit strings are ints, anything else stays text.
fn parse_untyped(value: &str) -> MaterialValue {
    if value.contains('.') {
        if let Ok(f) = value.parse::<f32>() {
            return MaterialValue::Scalar(f);
        }
    } else if let Ok(i) = value.parse::<i32>() {
        return MaterialValue::Int(i);
    }
    if let Some(color) = parse_color(value) {
        return MaterialValue::Color(color);
    }
    MaterialValue::Text(value.to_owned())
}

#[cfg(test)]
mod vmt_tests {
    use super::*;

    #[test]
    fn resolves_texture_and_boolean_params() {
        let vmt = Vmt::read(b"\"UnlitGeneric\" { $basetexture \"foo\" $additive \"1\" }")
            .unwrap();
        let params = MaterialParameterSet::resolve(&vmt, None);
        assert_eq!(params.shader, "UnlitGeneric");
        assert_eq!(params.get("$additive"), Some(&MaterialValue::Bool(true)));
        let Some(MaterialValue::Texture(slot)) = params.get("$basetexture") else {
            panic!("expected a texture slot");
        };
        assert_eq!(slot.path, "foo");
        assert!(slot.texture.is_none());
    }

    #[test]
    fn unknown_params_survive_in_raw_form() {
        let vmt =
            Vmt::read(b"\"Water\" { $flow_noise_texture \"x\" %compilewater 1 }").unwrap();
        let params = MaterialParameterSet::resolve(&vmt, None);
        assert!(params
            .raw
            .iter()
            .any(|(k, v)| k == "$flow_noise_texture" && v == "x"));
        assert_eq!(params.get("%compilewater"), Some(&MaterialValue::Int(1)));
    }

    #[test]
    fn colors_parse_both_notations() {
        assert_eq!(parse_color("{255 0 128}"), Some([255, 0, 128, 255]));
        assert_eq!(parse_color("[1 0 .5]"), Some([255, 0, 128, 255]));
        assert_eq!(parse_color("{255 0 0 200}"), Some([255, 0, 0, 200]));
        assert_eq!(parse_color("{1 2}"), None);
    }

    #[test]
    fn scalars_split_on_the_decimal_point() {
        assert_eq!(parse_untyped("2"), MaterialValue::Int(2));
        assert_eq!(parse_untyped("2.5"), MaterialValue::Scalar(2.5));
        assert_eq!(
            parse_untyped("metal"),
            MaterialValue::Text("metal".to_owned())
        );
    }

    #[test]
    fn booleans_compare_against_the_literal_one() {
        let vmt = Vmt::read(b"\"UnlitGeneric\" { $additive \"0\" $translucent \"2\" }").unwrap();
        let params = MaterialParameterSet::resolve(&vmt, None);
        assert_eq!(params.get("$additive"), Some(&MaterialValue::Bool(false)));
        assert_eq!(
            params.get("$translucent"),
            Some(&MaterialValue::Bool(false))
        );
    }
}
