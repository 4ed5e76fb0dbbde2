pub mod anim;
pub mod mdl;
pub mod vtx;
pub mod vvd;

pub use mdl::Mdl;
pub use vtx::Vtx;
pub use vvd::Vvd;

use crate::error::{Result, SourceError};
use vvd::ModelVertex;

/// One material's triangles inside a LOD, indexing the LOD's vertex buffer.
#[derive(Debug)]
pub struct MaterialMesh {
    pub material: i32,
    pub indices: Vec<u32>,
}

#[derive(Debug)]
pub struct LodMesh {
    pub vertices: Vec<ModelVertex>,
    pub meshes: Vec<MaterialMesh>,
}

/// The three-file compiled model, cross-referenced and ready for a scene
/// builder: header/skeleton from the mdl, vertices from the vvd, triangle
/// topology from the vtx.
#[derive(Debug)]
pub struct StudioModel {
    pub mdl: Mdl,
    pub vvd: Vvd,
    pub vtx: Vtx,
    /// Assembled geometry per LOD. A LOD that failed to assemble is `None`,
    /// with the reason in `diagnostics`; other LODs still decode.
    pub lods: Vec<Option<LodMesh>>,
    pub diagnostics: Vec<SourceError>,
}

impl StudioModel {
    /// The three files must come from the same compile: both companions
    /// carry the model header's checksum, and a mismatch means the set is
    /// incoherent, not merely stale.
    pub fn assemble(mdl: Mdl, vvd: Vvd, vtx: Vtx) -> Result<StudioModel> {
        let expected = mdl.header.checksum;
        if vvd.checksum() != expected {
            return Err(SourceError::ChecksumMismatch {
                file: "vvd",
                expected,
                actual: vvd.checksum(),
            });
        }
        if vtx.checksum() != expected {
            return Err(SourceError::ChecksumMismatch {
                file: "vtx",
                expected,
                actual: vtx.checksum(),
            });
        }
        if vtx.body.len() != mdl.body_parts.len() {
            return Err(SourceError::InvalidEncoding {
                file: "vtx",
                what: format!(
                    "{} body parts against {} in the model header",
                    vtx.body.len(),
                    mdl.body_parts.len()
                ),
            });
        }

        let num_lods = vtx.header.num_lods;
        let num_lods = num_lods.max(0) as usize;
        let mut lods = Vec::with_capacity(num_lods);
        let mut diagnostics = Vec::new();
        for lod in 0..num_lods {
            match assemble_lod(&mdl, &vvd, &vtx, lod) {
                Ok(mesh) => lods.push(Some(mesh)),
                Err(err) => {
                    log::warn!("model {}: lod {} failed: {}", mdl.name(), lod, err);
                    diagnostics.push(err);
                    lods.push(None);
                }
            }
        }

        Ok(StudioModel {
            mdl,
            vvd,
            vtx,
            lods,
            diagnostics,
        })
    }
}

fn assemble_lod(mdl: &Mdl, vvd: &Vvd, vtx: &Vtx, lod: usize) -> Result<LodMesh> {
    let vertices = vvd.lod_vertices(lod)?;
    let mut meshes = Vec::new();

    for (body_part, vtx_part) in mdl.body_parts.iter().zip(&vtx.body) {
        if vtx_part.models.len() != body_part.models.len() {
            return Err(SourceError::InvalidEncoding {
                file: "vtx",
                what: format!(
                    "body part \"{}\" has {} models against {}",
                    body_part.name,
                    vtx_part.models.len(),
                    body_part.models.len()
                ),
            });
        }
        for (model, vtx_model) in body_part.models.iter().zip(&vtx_part.models) {
            let Some(vtx_lod) = vtx_model.lods.get(lod) else {
                return Err(SourceError::InvalidEncoding {
                    file: "vtx",
                    what: format!("model \"{}\" is missing lod {}", model.name, lod),
                });
            };
            // the model's vertex offset is in bytes into the vertex block
            let model_vertex_start = model.vertex_index / 48;
            for (mesh, vtx_mesh) in model.meshes.iter().zip(&vtx_lod.meshes) {
                let base = model_vertex_start + mesh.vertex_offset;
                let mut indices = Vec::new();
                for group in &vtx_mesh.strip_groups {
                    for local in group.triangle_list()? {
                        let Some(vert) = group.verts.get(local as usize) else {
                            return Err(SourceError::InvalidEncoding {
                                file: "vtx",
                                what: format!("strip index {} outside vertex table", local),
                            });
                        };
                        let orig = vert.orig_mesh_vert_id;
                        let global = base + orig as i32;
                        if global < 0 || global as usize >= vertices.len() {
                            return Err(SourceError::InvalidEncoding {
                                file: "vtx",
                                what: format!(
                                    "vertex {} outside the {} vertex buffer",
                                    global,
                                    vertices.len()
                                ),
                            });
                        }
                        indices.push(global as u32);
                    }
                }
                meshes.push(MaterialMesh {
                    material: mesh.material,
                    indices,
                });
            }
        }
    }

    Ok(LodMesh { vertices, meshes })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use glam::{Quat, Vec3, Vec4};
    use std::mem;

    use super::mdl::{
        MdlHeader, RawAnimDesc, RawBodyPart, RawBone, RawMesh, RawModel, RawTexture, MDL_MAGIC,
    };
    use super::vtx::{
        BodyPartHeader, MeshHeader, ModelHeader, ModelLodHeader, StripGroupHeader, StripHeader,
        VtxFileHeader, VtxVertex, VTX_VERSION,
    };
    use super::vvd::{Fixup, ModelVertex, VertexFileHeader, VVD_MAGIC, VVD_VERSION};
    use crate::binaries::{BinArray, BinOffset};

    pub fn as_bytes<T>(value: &T) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>())
        }
    }

    fn push<T>(buf: &mut Vec<u8>, value: &T) -> usize {
        let at = buf.len();
        buf.extend_from_slice(as_bytes(value));
        at
    }

    fn push_cstr(buf: &mut Vec<u8>, s: &str) -> usize {
        let at = buf.len();
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
        at
    }

    fn bone_name(i: usize) -> String {
        match i {
            0 => "root".to_owned(),
            1 => "spine".to_owned(),
            _ => format!("bone{:02}", i),
        }
    }

    /// The spine bone's bind transform as it sits on disk: pos, quat, rot.
    pub fn spine_bone_transform() -> Vec<u8> {
        let mut out = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.0f32, 0.0, 0.0, 1.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.0f32, 0.0, 0.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn minimal_mdl(checksum: i32) -> Vec<u8> {
        mdl_fixture(checksum, &[-1, 0])
    }

    pub fn mdl_with_bone_parents(parents: &[i32]) -> Vec<u8> {
        mdl_fixture(1, parents)
    }

    /// A structurally complete model file: bones, one animation with raw
    /// transform data, one body part / model / mesh over three vertices, a
    /// texture with its search dir, one skin family, a surface prop.
    pub fn mdl_fixture(checksum: i32, parents: &[i32]) -> Vec<u8> {
        let mut buf = vec![0u8; mem::size_of::<MdlHeader>()];
        let n = parents.len();

        // bone table, then the names it points at
        let bones_at = buf.len();
        buf.resize(bones_at + n * mem::size_of::<RawBone>(), 0);
        let mut name_offsets = Vec::new();
        for i in 0..n {
            name_offsets.push(push_cstr(&mut buf, &bone_name(i)));
        }
        for (i, &parent) in parents.iter().enumerate() {
            let record_at = bones_at + i * mem::size_of::<RawBone>();
            let mut bone: RawBone = unsafe { mem::zeroed() };
            bone.name_index = BinOffset {
                index: (name_offsets[i] - record_at) as i32,
            };
            bone.parent = parent;
            bone.pos = if i == 1 {
                Vec3::new(1.0, 2.0, 3.0)
            } else {
                Vec3::ZERO
            };
            bone.quat = Quat::IDENTITY;
            bone.rot = Vec3::ZERO;
            bone.pos_scale = Vec3::splat(0.5);
            bone.rot_scale = Vec3::splat(0.25);
            buf[record_at..record_at + mem::size_of::<RawBone>()]
                .copy_from_slice(as_bytes(&bone));
        }

        // one animation descriptor with a raw transform for bone 0
        let anim_at = buf.len();
        buf.resize(anim_at + mem::size_of::<RawAnimDesc>(), 0);
        let anim_name_at = push_cstr(&mut buf, "idle");
        let anim_data_at = buf.len();
        buf.push(0); // bone
        buf.push(0x01 | 0x02); // RAWPOS | RAWROT
        buf.extend_from_slice(&0i16.to_le_bytes());
        buf.extend_from_slice(&[0x00, 0x80, 0x00, 0x80, 0x00, 0x40]); // identity quat48
        for v in [1.0f32, 2.0, 3.0] {
            buf.extend_from_slice(&half::f16::from_f32(v).to_bits().to_le_bytes());
        }
        let mut anim: RawAnimDesc = unsafe { mem::zeroed() };
        anim.name_index = BinOffset {
            index: (anim_name_at - anim_at) as i32,
        };
        anim.fps = 30.0;
        anim.frame_count = 1;
        anim.anim_index = (anim_data_at - anim_at) as i32;
        buf[anim_at..anim_at + mem::size_of::<RawAnimDesc>()].copy_from_slice(as_bytes(&anim));

        // body part -> model -> mesh
        let body_at = buf.len();
        buf.resize(body_at + mem::size_of::<RawBodyPart>(), 0);
        let model_at = buf.len();
        buf.resize(model_at + mem::size_of::<RawModel>(), 0);
        let mesh_at = buf.len();
        let mut mesh: RawMesh = unsafe { mem::zeroed() };
        mesh.num_vertices = 3;
        push(&mut buf, &mesh);
        let body_name_at = push_cstr(&mut buf, "body");

        let mut model: RawModel = unsafe { mem::zeroed() };
        model.name = fixedstr::zstr::from("body0");
        model.meshes = BinArray::new(1, (mesh_at - model_at) as i32);
        model.num_vertices = 3;
        model.vertex_index = 0;
        buf[model_at..model_at + mem::size_of::<RawModel>()].copy_from_slice(as_bytes(&model));

        let mut body: RawBodyPart = unsafe { mem::zeroed() };
        body.name_index = BinOffset {
            index: (body_name_at - body_at) as i32,
        };
        body.num_models = 1;
        body.base = 1;
        body.model_index = BinOffset {
            index: (model_at - body_at) as i32,
        };
        buf[body_at..body_at + mem::size_of::<RawBodyPart>()].copy_from_slice(as_bytes(&body));

        // material table plus its search dir
        let texture_at = buf.len();
        buf.resize(texture_at + mem::size_of::<RawTexture>(), 0);
        let texture_name_at = push_cstr(&mut buf, "crate01");
        let mut texture: RawTexture = unsafe { mem::zeroed() };
        texture.name_index = BinOffset {
            index: (texture_name_at - texture_at) as i32,
        };
        buf[texture_at..texture_at + mem::size_of::<RawTexture>()]
            .copy_from_slice(as_bytes(&texture));

        let dir_str_at = push_cstr(&mut buf, "models/fixtures/");
        let dir_table_at = push(&mut buf, &BinOffset {
            index: dir_str_at as i32,
        });

        // one skin family over one reference
        let skin_at = push(&mut buf, &0u16);

        let surface_at = push_cstr(&mut buf, "metal");

        let mut header: MdlHeader = unsafe { mem::zeroed() };
        header.id = MDL_MAGIC;
        header.version = 48;
        header.checksum = checksum;
        header.name = fixedstr::zstr::from("fixtures/crate01");
        header.bone = BinArray::new(n as i32, bones_at as i32);
        header.local_anim = BinArray::new(1, anim_at as i32);
        header.body_part = BinArray::new(1, body_at as i32);
        header.texture = BinArray::new(1, texture_at as i32);
        header.texture_dir = BinArray::new(1, dir_table_at as i32);
        header.skin_family_count = 1;
        header.skin_reference_count = 1;
        header.skin_reference_index = BinOffset {
            index: skin_at as i32,
        };
        header.surface_prop_index = BinOffset {
            index: surface_at as i32,
        };
        header.data_length = buf.len() as i32;
        buf[..mem::size_of::<MdlHeader>()].copy_from_slice(as_bytes(&header));

        buf
    }

    /// Vertex file with three vertices in a right triangle, unit tangents
    /// and an optional fixup table.
    pub fn minimal_vvd(checksum: i32, fixups: &[Fixup]) -> Vec<u8> {
        let mut buf = vec![0u8; mem::size_of::<VertexFileHeader>()];

        let fixups_at = buf.len();
        for fixup in fixups {
            push(&mut buf, fixup);
        }
        let verts_at = buf.len();
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        for pos in positions {
            let mut vert: ModelVertex = unsafe { mem::zeroed() };
            vert.bone_weight = Vec3::new(1.0, 0.0, 0.0);
            vert.num_bones = 1;
            vert.pos = pos;
            vert.norm = Vec3::Z;
            push(&mut buf, &vert);
        }
        let tangents_at = buf.len();
        for _ in 0..3 {
            push(&mut buf, &Vec4::new(1.0, 0.0, 0.0, 1.0));
        }

        let mut header: VertexFileHeader = unsafe { mem::zeroed() };
        header.id = VVD_MAGIC;
        header.version = VVD_VERSION;
        header.checksum = checksum;
        header.num_lods = 1;
        header.num_lod_vertexes[0] = 3;
        header.num_fixups = fixups.len() as i32;
        header.fixup_table_start = BinOffset {
            index: fixups_at as i32,
        };
        header.vertex_data_start = BinOffset {
            index: verts_at as i32,
        };
        header.tangent_data_start = BinOffset {
            index: tangents_at as i32,
        };
        buf[..mem::size_of::<VertexFileHeader>()].copy_from_slice(as_bytes(&header));

        buf
    }

    /// Topology file with a single trilist strip over the three fixture
    /// vertices.
    pub fn minimal_vtx(checksum: i32) -> Vec<u8> {
        let mut buf = vec![0u8; mem::size_of::<VtxFileHeader>()];

        let part_at = buf.len();
        buf.resize(part_at + mem::size_of::<BodyPartHeader>(), 0);
        let model_at = buf.len();
        buf.resize(model_at + mem::size_of::<ModelHeader>(), 0);
        let lod_at = buf.len();
        buf.resize(lod_at + mem::size_of::<ModelLodHeader>(), 0);
        let mesh_at = buf.len();
        buf.resize(mesh_at + mem::size_of::<MeshHeader>(), 0);
        let group_at = buf.len();
        buf.resize(group_at + mem::size_of::<StripGroupHeader>(), 0);

        let verts_at = buf.len();
        for i in 0..3u16 {
            let mut vert: VtxVertex = unsafe { mem::zeroed() };
            vert.num_bones = 1;
            vert.orig_mesh_vert_id = i;
            push(&mut buf, &vert);
        }
        let indices_at = buf.len();
        for i in [0u16, 1, 2] {
            push(&mut buf, &i);
        }
        let strips_at = buf.len();
        let mut strip: StripHeader = unsafe { mem::zeroed() };
        strip.num_indices = 3;
        strip.num_verts = 3;
        strip.num_bones = 1;
        strip.flags = 0x01; // trilist
        push(&mut buf, &strip);

        let mut group: StripGroupHeader = unsafe { mem::zeroed() };
        group.verts = BinArray::new(3, (verts_at - group_at) as i32);
        group.indices = BinArray::new(3, (indices_at - group_at) as i32);
        group.strips = BinArray::new(1, (strips_at - group_at) as i32);
        buf[group_at..group_at + mem::size_of::<StripGroupHeader>()]
            .copy_from_slice(as_bytes(&group));

        let mut mesh: MeshHeader = unsafe { mem::zeroed() };
        mesh.strip_groups = BinArray::new(1, (group_at - mesh_at) as i32);
        buf[mesh_at..mesh_at + mem::size_of::<MeshHeader>()].copy_from_slice(as_bytes(&mesh));

        let mut lod: ModelLodHeader = unsafe { mem::zeroed() };
        lod.meshes = BinArray::new(1, (mesh_at - lod_at) as i32);
        buf[lod_at..lod_at + mem::size_of::<ModelLodHeader>()].copy_from_slice(as_bytes(&lod));

        let mut model: ModelHeader = unsafe { mem::zeroed() };
        model.lods = BinArray::new(1, (lod_at - model_at) as i32);
        buf[model_at..model_at + mem::size_of::<ModelHeader>()].copy_from_slice(as_bytes(&model));

        let mut part: BodyPartHeader = unsafe { mem::zeroed() };
        part.models = BinArray::new(1, (model_at - part_at) as i32);
        buf[part_at..part_at + mem::size_of::<BodyPartHeader>()].copy_from_slice(as_bytes(&part));

        let mut header: VtxFileHeader = unsafe { mem::zeroed() };
        header.version = VTX_VERSION;
        header.vert_cache_size = 24;
        header.max_bones_per_strip = 53;
        header.max_bones_per_tri = 9;
        header.max_bones_per_vert = 3;
        header.checksum = checksum;
        header.num_lods = 1;
        header.body_parts = BinArray::new(1, part_at as i32);
        buf[..mem::size_of::<VtxFileHeader>()].copy_from_slice(as_bytes(&header));

        buf
    }
}
