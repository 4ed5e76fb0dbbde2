pub mod consts;
pub mod entities;
pub mod gamelump;
pub mod header;

use common::vcursor::VCursor;

use crate::error::{Result, SourceError};
use crate::fgd::{DecodeSession, EntityRecord, SchemaRegistry};

pub use self::consts::LumpType;
pub use self::entities::RawEntity;
pub use self::gamelump::StaticProp;
pub use self::header::BspHeader;

/// A decoded map: the entity lump interpreted through the schema registry,
/// plus the static prop game lump. Everything else stays addressable as raw
/// lump bytes via [`BspHeader::lump_bytes`].
pub struct Bsp {
    pub header: BspHeader,
    pub entities: Vec<EntityRecord>,
    pub static_props: Vec<StaticProp>,
    /// Per-entity and per-prop problems; the map as a whole still decoded.
    pub diagnostics: Vec<SourceError>,
}

impl Bsp {
    pub fn read(
        data: &[u8],
        session: &mut DecodeSession,
        registry: &SchemaRegistry,
    ) -> Result<Bsp> {
        let mut cursor = VCursor::new(data);
        let header = BspHeader::read(&mut cursor)?;
        let mut diagnostics = Vec::new();

        let entity_bytes = header.lump_bytes(LumpType::Entities, data)?;
        let entity_text =
            std::str::from_utf8(entity_bytes).map_err(|_| SourceError::InvalidEncoding {
                file: "bsp",
                what: "entity lump is not valid utf-8".to_owned(),
            })?;
        let raw_entities = entities::parse_entity_lump(entity_text, &mut diagnostics);
        let entities = registry.parse_entities(session, raw_entities, &mut diagnostics);

        let game_lump = header.lump(LumpType::GameLump);
        let game_lump_len = game_lump.file_len;
        let static_props = if game_lump_len > 0 {
            let base = game_lump.file_ofs;
            gamelump::read_static_props(&mut cursor, base.max(0) as usize, &mut diagnostics)?
        } else {
            Vec::new()
        };

        Ok(Bsp {
            header,
            entities,
            static_props,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod bsp_tests {
    use super::*;
    use crate::bsp::gamelump::gamelump_fixtures;
    use crate::studio::test_fixtures::as_bytes;
    use glam::Vec3;
    use std::mem;

    use header::{BspLump, BSP_MAGIC};

    fn bsp_fixture(entity_text: &str, with_props: bool) -> Vec<u8> {
        let header_size = mem::size_of::<BspHeader>();
        let mut buf = vec![0u8; header_size];

        let ent_at = buf.len();
        buf.extend_from_slice(entity_text.as_bytes());
        buf.push(0);
        let ent_len = buf.len() - ent_at;

        let mut header: BspHeader = unsafe { mem::zeroed() };
        header.ident = BSP_MAGIC;
        header.version = 20;
        header.map_revision = 1;
        header.lumps[LumpType::Entities as usize] = BspLump {
            file_ofs: ent_at as i32,
            file_len: ent_len as i32,
            version: 0,
            four_cc: [0; 4],
        };

        if with_props {
            let game_at = buf.len();
            let lump = gamelump_fixtures::static_prop_lump(
                game_at,
                &["models/props_c17/bench01a.mdl"],
                &[(0, Vec3::new(16.0, 0.0, 8.0))],
            );
            buf.extend_from_slice(&lump);
            header.lumps[LumpType::GameLump as usize] = BspLump {
                file_ofs: game_at as i32,
                file_len: lump.len() as i32,
                version: 0,
                four_cc: [0; 4],
            };
        }

        buf[..header_size].copy_from_slice(as_bytes(&header));
        buf
    }

    #[test]
    fn decodes_entities_and_props() {
        let text = "{\"classname\" \"worldspawn\"}\n{\"classname\" \"light\" \"origin\" \"1 2 3\" \"_light\" \"255 0 0 200\"}";
        let data = bsp_fixture(text, true);
        let mut session = DecodeSession::default();
        let registry = SchemaRegistry::standard();
        let bsp = Bsp::read(&data, &mut session, &registry).unwrap();

        assert_eq!(bsp.entities.len(), 2);
        assert_eq!(bsp.entities[1].classname, "light");
        assert_eq!(bsp.static_props.len(), 1);
        assert_eq!(bsp.static_props[0].model, "models/props_c17/bench01a.mdl");
    }

    #[test]
    fn map_without_a_game_lump_still_decodes() {
        let data = bsp_fixture("{\"classname\" \"worldspawn\"}", false);
        let mut session = DecodeSession::default();
        let registry = SchemaRegistry::standard();
        let bsp = Bsp::read(&data, &mut session, &registry).unwrap();
        assert!(bsp.static_props.is_empty());
        assert!(bsp.diagnostics.is_empty());
    }
}
