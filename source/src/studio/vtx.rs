// VTX is Source's hardware mesh strip format: material, skinning and
// triangle strip/fan information for each LOD of each mesh in the model.
// The file is a tree of (count, offset) tables, body part down to strip
// group, where every offset is relative to the record that declares it.

use common::vcursor::VCursor;

use crate::binaries::{BinArray, BinaryData};
use crate::error::{Result, SourceError};

pub const VTX_VERSION: i32 = 7;

const STRIP_IS_TRILIST: u8 = 0x01;
const STRIP_IS_TRISTRIP: u8 = 0x02;

// this structure is in <mod folder>/src/public/optimize.h
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VtxFileHeader {
    // file version as defined by OPTIMIZED_MODEL_FILE_VERSION (currently 7)
    pub version: i32,

    // hardware params that affect how the model is to be optimized.
    pub vert_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_tri: u16,
    pub max_bones_per_vert: i32,

    // must match checksum in the .mdl
    pub checksum: i32,

    pub num_lods: i32, // also specified in the model header, and should match

    // one material replacement list per LOD
    pub material_replacement_list_offset: i32,

    pub body_parts: BinArray<BodyPartHeader>,
}

impl BinaryData for VtxFileHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct BodyPartHeader {
    pub models: BinArray<ModelHeader>,
}

impl BinaryData for BodyPartHeader {}

// maps one to one with models in the mdl file
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct ModelHeader {
    pub lods: BinArray<ModelLodHeader>,
}

impl BinaryData for ModelHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct ModelLodHeader {
    pub meshes: BinArray<MeshHeader>,
    // the distance at which the engine switches to this LOD
    pub switch_point: f32,
}

impl BinaryData for ModelLodHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct MeshHeader {
    pub strip_groups: BinArray<StripGroupHeader>,
    pub flags: u8,
}

impl BinaryData for MeshHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct StripGroupHeader {
    // these are the arrays of all verts and indices for this mesh; strips
    // index into them
    pub verts: BinArray<VtxVertex>,
    pub indices: BinArray<u16>,
    pub strips: BinArray<StripHeader>,
    pub flags: u8,
}

impl BinaryData for StripGroupHeader {}

// a strip is a piece of a stripgroup which is divided by bones
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct StripHeader {
    pub num_indices: i32,
    pub index_offset: i32,

    pub num_verts: i32,
    pub vert_offset: i32,

    pub num_bones: i16,
    pub flags: u8,

    pub num_bone_state_changes: i32,
    pub bone_state_change_offset: i32,
}

impl BinaryData for StripHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct VtxVertex {
    // these index into the mesh's vert[orig_mesh_vert_id]'s bones
    pub bone_weight_index: [u8; 3],
    pub num_bones: u8,

    // index of this vertex in the linked vertex file's array, relative to
    // the owning mesh's first vertex
    pub orig_mesh_vert_id: u16,

    pub bone_id: [i8; 3],
}

#[derive(Debug)]
pub struct VtxStripGroup {
    pub flags: u8,
    pub verts: Box<[VtxVertex]>,
    pub indices: Box<[u16]>,
    pub strips: Vec<StripHeader>,
}

impl VtxStripGroup {
    /// Flatten the group's strips into one triangle list of local vertex
    /// table indices. Strips are concatenated in file order.
    pub fn triangle_list(&self) -> Result<Vec<u16>> {
        let mut tris = Vec::new();
        for strip in &self.strips {
            let first = strip.index_offset;
            let count = strip.num_indices;
            let first = first.max(0) as usize;
            let count = count.max(0) as usize;
            if first + count > self.indices.len() {
                return Err(SourceError::InvalidEncoding {
                    file: "vtx",
                    what: format!(
                        "strip spans indices {}..{} of {}",
                        first,
                        first + count,
                        self.indices.len()
                    ),
                });
            }
            let ids = &self.indices[first..first + count];
            let flags = strip.flags;
            if flags & STRIP_IS_TRILIST != 0 {
                tris.extend_from_slice(ids);
            } else if flags & STRIP_IS_TRISTRIP != 0 {
                // unwind, flipping winding on every other triangle
                for i in 0..ids.len().saturating_sub(2) {
                    let (a, b, c) = if i % 2 == 0 {
                        (ids[i], ids[i + 1], ids[i + 2])
                    } else {
                        (ids[i + 1], ids[i], ids[i + 2])
                    };
                    if a == b || b == c || a == c {
                        continue; // degenerate stitch triangle
                    }
                    tris.extend_from_slice(&[a, b, c]);
                }
            } else {
                return Err(SourceError::UnsupportedFeature {
                    file: "vtx",
                    what: format!("strip flags {:#04x}", flags),
                });
            }
        }
        Ok(tris)
    }
}

#[derive(Debug)]
pub struct VtxMesh {
    pub flags: u8,
    pub strip_groups: Vec<VtxStripGroup>,
}

#[derive(Debug)]
pub struct VtxModelLod {
    pub switch_point: f32,
    pub meshes: Vec<VtxMesh>,
}

#[derive(Debug)]
pub struct VtxModel {
    pub lods: Vec<VtxModelLod>,
}

#[derive(Debug)]
pub struct VtxBodyPart {
    pub models: Vec<VtxModel>,
}

#[derive(Debug)]
pub struct Vtx {
    pub header: VtxFileHeader,
    pub body: Vec<VtxBodyPart>,
}

impl Vtx {
    pub fn read(data: &[u8]) -> Result<Vtx> {
        let mut cursor = VCursor::new(data);
        let header = VtxFileHeader::read(&mut cursor)?;

        let version = header.version;
        if version != VTX_VERSION {
            return Err(SourceError::UnsupportedFeature {
                file: "vtx",
                what: format!("optimized model version {}", version),
            });
        }

        let mut body = Vec::new();
        for (at, part) in header.body_parts.read(&mut cursor, 0)? {
            let mut models = Vec::new();
            for (at, model) in part.models.read(&mut cursor, at)? {
                let mut lods = Vec::new();
                for (at, lod) in model.lods.read(&mut cursor, at)? {
                    let mut meshes = Vec::new();
                    for (at, mesh) in lod.meshes.read(&mut cursor, at)? {
                        let mut strip_groups = Vec::new();
                        for (at, group) in mesh.strip_groups.read(&mut cursor, at)? {
                            let verts = group.verts.read_pod(&mut cursor, at)?;
                            let indices = group.indices.read_pod(&mut cursor, at)?;
                            let strips = group
                                .strips
                                .read(&mut cursor, at)?
                                .into_iter()
                                .map(|(_, s)| s)
                                .collect();
                            strip_groups.push(VtxStripGroup {
                                flags: group.flags,
                                verts,
                                indices,
                                strips,
                            });
                        }
                        meshes.push(VtxMesh {
                            flags: mesh.flags,
                            strip_groups,
                        });
                    }
                    lods.push(VtxModelLod {
                        switch_point: lod.switch_point,
                        meshes,
                    });
                }
                models.push(VtxModel { lods });
            }
            body.push(VtxBodyPart { models });
        }

        Ok(Vtx { header, body })
    }

    pub fn checksum(&self) -> i32 {
        self.header.checksum
    }
}
