use ini::Ini;
use std::path::{Path, PathBuf};

use common::vfile::VFileSystem;
use common::vpath::{VGlobalPath, VPath};

use crate::bsp::Bsp;
use crate::error::{Result, SourceError};
use crate::fgd::{DecodeSession, SchemaRegistry};
use crate::studio::{Mdl, StudioModel, Vtx, Vvd};
use crate::vmt::{MaterialParameterSet, Vmt};
use crate::vtf::Vtf;

/// One mounted content tree: a game directory on disk, or an in-memory
/// tree (tests, preloaded archives unpacked by the host).
pub enum ContentRoot {
    Dir(PathBuf),
    Memory(VFileSystem),
}

/// The prioritized set of mounted content roots for a session, mirroring a
/// gameinfo-style search path list. Built once; lookups are read-only, so a
/// shared reference can serve any number of decode threads.
pub struct GameData {
    roots: Vec<ContentRoot>,
    registry: SchemaRegistry,
}

impl GameData {
    pub fn new(roots: Vec<ContentRoot>) -> GameData {
        GameData {
            roots,
            registry: SchemaRegistry::standard(),
        }
    }

    /// Mount list from an INI launch file:
    ///
    /// ```ini
    /// [launch]
    /// game = hl2
    ///
    /// [hl2]
    /// root = /games/Half-Life 2
    /// mount = hl2
    /// mount = hl2_misc
    /// ```
    pub fn from_ini(ini: &Ini) -> Result<GameData> {
        let launch = ini
            .section(Some("launch"))
            .ok_or_else(|| SourceError::InvalidEncoding {
                file: "launch.ini",
                what: "missing [launch] section".to_owned(),
            })?;
        let game = launch
            .get("game")
            .ok_or_else(|| SourceError::InvalidEncoding {
                file: "launch.ini",
                what: "missing game key".to_owned(),
            })?;
        let section = ini
            .section(Some(game))
            .ok_or_else(|| SourceError::InvalidEncoding {
                file: "launch.ini",
                what: format!("missing [{}] section", game),
            })?;

        let root = PathBuf::from(section.get("root").unwrap_or(""));
        let mut roots = Vec::new();
        for mount in section.get_all("mount") {
            log::debug!("mounting {}", mount);
            roots.push(ContentRoot::Dir(root.join(mount)));
        }
        if roots.is_empty() {
            roots.push(ContentRoot::Dir(root));
        }
        Ok(GameData::new(roots))
    }

    /// First hit across the mounted roots, in mount priority order.
    pub fn find(&self, path: &dyn VPath) -> Result<Vec<u8>> {
        let rel = path.full_path();
        for root in &self.roots {
            match root {
                ContentRoot::Dir(dir) => {
                    let candidate = dir.join(Path::new(&rel));
                    if let Ok(bytes) = std::fs::read(&candidate) {
                        return Ok(bytes);
                    }
                }
                ContentRoot::Memory(fs) => {
                    if let Some(bytes) = fs.get_str(&rel) {
                        return Ok(bytes.to_vec());
                    }
                }
            }
        }
        Err(SourceError::MissingAsset { path: rel })
    }

    pub fn load_mdl(&self, path: &dyn VPath) -> Result<Mdl> {
        Mdl::read(&self.find(path)?)
    }

    pub fn load_vvd(&self, path: &dyn VPath) -> Result<Vvd> {
        Vvd::read(&self.find(path)?)
    }

    pub fn load_vtx(&self, path: &dyn VPath) -> Result<Vtx> {
        Vtx::read(&self.find(path)?)
    }

    pub fn load_vtf(&self, path: &dyn VPath) -> Result<Vtf> {
        Vtf::read(&self.find(path)?)
    }

    pub fn load_vmt(&self, path: &dyn VPath) -> Result<Vmt> {
        Vmt::read(&self.find(path)?)
    }

    pub fn load_material(&self, path: &dyn VPath) -> Result<MaterialParameterSet> {
        let vmt = self.load_vmt(path)?;
        Ok(MaterialParameterSet::resolve(&vmt, Some(self)))
    }

    pub fn load_bsp(&self, path: &dyn VPath) -> Result<Bsp> {
        let data = self.find(path)?;
        let mut session = DecodeSession::default();
        Bsp::read(&data, &mut session, &self.registry)
    }

    /// Load and cross-reference the model's three-file set. The vertex file
    /// shares the model's stem; the topology file is probed with the
    /// renderer-specific double extensions.
    pub fn load_model(&self, path: &dyn VPath) -> Result<StudioModel> {
        let mdl = self.load_mdl(path)?;

        let full = path.full_path();
        let stem = full.strip_suffix(".mdl").unwrap_or(&full);

        let vvd_path = format!("{}.vvd", stem);
        let vvd = self.load_vvd(&VGlobalPath::from(vvd_path.as_str()))?;

        let mut vtx = None;
        for suffix in ["dx90.vtx", "dx80.vtx", "sw.vtx"] {
            let candidate = format!("{}.{}", stem, suffix);
            match self.load_vtx(&VGlobalPath::from(candidate.as_str())) {
                Ok(found) => {
                    vtx = Some(found);
                    break;
                }
                Err(SourceError::MissingAsset { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        let Some(vtx) = vtx else {
            return Err(SourceError::MissingAsset {
                path: format!("{}.dx90.vtx", stem),
            });
        };

        StudioModel::assemble(mdl, vvd, vtx)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}
