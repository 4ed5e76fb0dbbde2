use glam::{Vec2, Vec3, Vec4};

use common::vcursor::VCursor;

use crate::binaries::{BinOffset, BinaryData};
use crate::error::{Result, SourceError};

pub const VVD_MAGIC: [u8; 4] = *b"IDSV";
pub const VVD_VERSION: i32 = 4;
pub const MAX_LODS: usize = 8;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VertexFileHeader {
    pub id: [u8; 4],                      // MODEL_VERTEX_FILE_ID
    pub version: i32,                     // MODEL_VERTEX_FILE_VERSION
    pub checksum: i32,                    // same as the model header, ensures sync
    pub num_lods: i32,                    // num of valid lods
    pub num_lod_vertexes: [i32; MAX_LODS], // num verts for desired root lod
    pub num_fixups: i32,                  // num of vertexFileFixup_t
    pub fixup_table_start: BinOffset,     // offset from base to fixup table
    pub vertex_data_start: BinOffset,     // offset from base to vertex block
    pub tangent_data_start: BinOffset,    // offset from base to tangent block
}

impl BinaryData for VertexFileHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct ModelVertex {
    pub bone_weight: Vec3,
    pub bone_id: [u8; 3],
    pub num_bones: u8,
    pub pos: Vec3,
    pub norm: Vec3,
    pub uv: Vec2,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct Fixup {
    pub lod: i32, // used by this lod and coarser ones
    pub source_vertex_id: i32,
    pub num_vertexes: i32,
}

#[derive(Debug)]
pub struct Vvd {
    pub header: VertexFileHeader,
    pub verts: Box<[ModelVertex]>,
    pub tangents: Box<[Vec4]>,
    pub fixups: Box<[Fixup]>,
}

impl Vvd {
    pub fn read(data: &[u8]) -> Result<Vvd> {
        let mut cursor = VCursor::new(data);
        let header = VertexFileHeader::read(&mut cursor)?;

        let id = header.id;
        if id != VVD_MAGIC {
            return Err(SourceError::InvalidEncoding {
                file: "vvd",
                what: format!("magic {:?}, expected {:?}", id, VVD_MAGIC),
            });
        }
        let version = header.version;
        if version != VVD_VERSION {
            return Err(SourceError::UnsupportedFeature {
                file: "vvd",
                what: format!("vertex file version {}", version),
            });
        }

        let total_verts = header.num_lod_vertexes[0];
        let total_verts = total_verts.max(0) as usize;
        let num_fixups = header.num_fixups;

        let verts = header
            .vertex_data_start
            .read_pod_slice::<ModelVertex>(&mut cursor, 0, total_verts)?;
        let tangents = header
            .tangent_data_start
            .read_pod_slice::<Vec4>(&mut cursor, 0, total_verts)?;
        let fixups = header.fixup_table_start.read_pod_slice::<Fixup>(
            &mut cursor,
            0,
            num_fixups.max(0) as usize,
        )?;

        Ok(Vvd {
            header,
            verts,
            tangents,
            fixups,
        })
    }

    pub fn checksum(&self) -> i32 {
        self.header.checksum
    }

    /// The vertex buffer for one level of detail, in the order the topology
    /// file's indices expect.
    ///
    /// Models whose LODs share vertices write a fixup table instead of
    /// duplicating the buffer per LOD; applying the fixups that cover the
    /// requested LOD reproduces that LOD's vertex ordering.
    pub fn lod_vertices(&self, lod: usize) -> Result<Vec<ModelVertex>> {
        if self.fixups.is_empty() {
            return Ok(self.verts.to_vec());
        }
        let mut out = Vec::new();
        for (i, fixup) in self.fixups.iter().enumerate() {
            if (fixup.lod as usize) < lod {
                continue;
            }
            let src = fixup.source_vertex_id.max(0) as usize;
            let count = fixup.num_vertexes.max(0) as usize;
            let end = src + count;
            if end > self.verts.len() {
                return Err(SourceError::InvalidEncoding {
                    file: "vvd",
                    what: format!(
                        "fixup {} spans vertices {}..{} of {}",
                        i,
                        src,
                        end,
                        self.verts.len()
                    ),
                });
            }
            out.extend_from_slice(&self.verts[src..end]);
        }
        Ok(out)
    }
}
