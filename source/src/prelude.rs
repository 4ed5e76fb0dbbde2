pub use crate::bsp::{consts::LumpType, header::BspHeader, Bsp};
pub use crate::dmx::{session::Session, DmxDocument, DmxHandle};
pub use crate::error::{Result, SourceError};
pub use crate::fgd::{DecodeSession, EntityRecord, SchemaRegistry};
pub use crate::game_data::GameData;
pub use crate::studio::{mdl::Mdl, vtx::Vtx, vvd::Vvd, StudioModel};
pub use crate::vmt::{MaterialParameterSet, Vmt};
pub use crate::vtf::{DecodedTexture, Vtf};
