// MDL is the extension for Source's proprietary model format. It defines the
// structure of the model along with animation, bounding box, material, mesh
// and LOD information. It does not contain everything needed for the model:
// vertex data lives in the companion VVD file and triangle topology in the
// VTX file, tied together by a shared checksum.
//
// The header is a series of (count, offset) tables. Offsets in the main
// header are from the very beginning of the file; offsets inside table
// records (bone names, mesh tables, animation data) are relative to the
// record that holds them.

use fixedstr::zstr;
use flagset::{flags, FlagSet};
use glam::{Quat, Vec3};

use common::vcursor::VCursor;

use crate::binaries::{BinArray, BinOffset, BinaryData, NilEntry};
use crate::error::{Result, SourceError};
use crate::studio::anim::{self, AnimData};

pub const MDL_MAGIC: [u8; 4] = *b"IDST";

flags! {
    #[repr(u32)]
    pub enum AnimDescFlags: u32 {
        LOOPING = 0x0001,
        SNAP = 0x0002,
        DELTA = 0x0004,
        AUTOPLAY = 0x0008,
        POST = 0x0010,
        ALLZEROS = 0x0020,
        FRAMEANIM = 0x0040,
        CYCLEPOSE = 0x0080,
        REALTIME = 0x0100,
        LOCAL = 0x0200,
        HIDDEN = 0x0400,
        OVERRIDE = 0x0800,
        ACTIVITY = 0x1000,
        EVENT = 0x2000,
        WORLD = 0x4000,
        NOFORCELOOP = 0x8000,
        EVENTCLIENT = 0x10000,
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct MdlHeader {
    pub id: [u8; 4],    // Model format ID, such as "IDST" (0x49 0x44 0x53 0x54)
    pub version: i32,   // Format version number, such as 48 (0x30,0x00,0x00,0x00)
    pub checksum: i32,  // This has to be the same in the vvd and vtx files to load!
    pub name: zstr<64>, // The internal name of the model, padded with null bytes.
    pub data_length: i32, // Data size of MDL file in bytes.

    pub eye_position: Vec3, // Position of player viewpoint relative to model origin
    pub illum_position: Vec3, // Position used to calculate ambient light contribution
    pub hull_min: Vec3,     // Corner of model hull box with the least X/Y/Z values
    pub hull_max: Vec3,     // Opposite corner of model hull box
    pub view_bbmin: Vec3,
    pub view_bbmax: Vec3,

    pub flags: i32,

    pub bone: BinArray<RawBone>,
    pub bone_controller: BinArray<NilEntry>,
    pub hitbox_set: BinArray<NilEntry>,
    pub local_anim: BinArray<RawAnimDesc>,
    pub local_seq: BinArray<NilEntry>,

    pub activity_list_version: i32,
    pub events_indexed: i32,

    // VMT texture filenames
    pub texture: BinArray<RawTexture>,
    // Offsets to the null-terminated search directories materials live under
    pub texture_dir: BinArray<BinOffset>,

    // Each skin family assigns a texture id to a skin location
    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_reference_index: BinOffset,

    pub body_part: BinArray<RawBodyPart>,

    // Local attachment points
    pub attachment: BinArray<RawAttachment>,

    pub local_node: BinArray<NilEntry>,
    pub local_node_name_index: BinOffset,

    pub flex_desc: BinArray<NilEntry>,
    pub flex_controller: BinArray<NilEntry>,
    pub flex_rule: BinArray<NilEntry>,
    pub ik_chain: BinArray<NilEntry>,
    pub mouth: BinArray<NilEntry>,
    pub local_pose_param: BinArray<NilEntry>,

    // Surface property value (single null-terminated string)
    pub surface_prop_index: BinOffset,

    // Unusual: index comes first, then count.
    pub keyvalue_index: BinOffset,
    pub keyvalue_count: i32,

    pub ik_lock: BinArray<NilEntry>,

    pub mass: f32,
    pub contents: i32,

    // Other models referenced for re-used sequences and animations
    pub include_model: BinArray<NilEntry>,

    pub virtual_model: i32, // Placeholder for mutable void*

    pub anim_block_name_index: BinOffset,
    pub anim_block: BinArray<RawAnimBlock>,
    pub anim_block_model: i32, // Placeholder for mutable void*

    pub bone_table_name_index: BinOffset,

    pub vertex_base: i32, // Placeholder for void*
    pub offset_base: i32, // Placeholder for void*

    pub directional_dot_product: i8,
    pub root_lod: i8,
    // 0 means any allowed, N means LOD 0 -> (N-1)
    pub num_allowed_root_lods: i8,
    unused0: i8,
    unused1: i32,

    pub flex_controller_ui: BinArray<NilEntry>,

    pub vert_anim_fixed_point_scale: f32,
    unused2: i32,

    // Offset for the optional second header; zero if not present.
    pub studiohdr2_index: i32,
    unused3: i32,
    // The header is 408 bytes long in total.
}

impl BinaryData for MdlHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawBone {
    pub name_index: BinOffset, // offset relative to this record
    pub parent: i32,           // -1 for a root bone
    pub bone_controller: [i32; 6],
    pub pos: Vec3, // bind pose, parent-relative
    pub quat: Quat,
    pub rot: Vec3, // same orientation as radian euler
    pub pos_scale: Vec3,
    pub rot_scale: Vec3,
    pub pose_to_bone: [f32; 12],
    pub q_alignment: Quat,
    pub flags: i32,
    pub proc_type: i32,
    pub proc_index: i32,
    pub physics_bone: i32,
    pub surface_prop_index: BinOffset,
    pub contents: i32,
    unused: [i32; 8],
}

impl BinaryData for RawBone {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawTexture {
    // Offset for the null-terminated name, relative to this record.
    pub name_index: BinOffset,
    pub flags: i32,
    used: i32,
    unused: i32,
    material: i32,        // Placeholder for IMaterial
    client_material: i32, // Placeholder for void*
    unused2: [i32; 10],
    // Struct is 64 bytes long
}

impl BinaryData for RawTexture {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawBodyPart {
    pub name_index: BinOffset,
    pub num_models: i32,
    pub base: i32,
    pub model_index: BinOffset,
}

impl BinaryData for RawBodyPart {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawModel {
    pub name: zstr<64>,
    pub model_type: i32,
    pub bounding_radius: f32,
    pub meshes: BinArray<RawMesh>,
    pub num_vertices: i32, // number of unique vertices/normals/texcoords
    pub vertex_index: i32, // byte offset into the vertex file's vertex block
    pub tangents_index: i32,
    pub num_attachments: i32,
    pub attachment_index: i32,
    pub num_eyeballs: i32,
    pub eyeball_index: i32,
    vertex_data: i32, // base of external vertex data stores
    tangent_data: i32,
    unused: [i32; 8],
}

impl BinaryData for RawModel {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawMesh {
    pub material: i32,
    pub model_index: i32,
    pub num_vertices: i32,
    pub vertex_offset: i32, // relative to the owning model's first vertex
    pub num_flexes: i32,
    pub flex_index: i32,
    pub material_type: i32,
    pub material_param: i32,
    pub mesh_id: i32,
    pub center: Vec3,
    vertex_data: i32, // runtime mstudio_meshvertexdata_t
    pub num_lod_vertices: [i32; 8],
    unused: [i32; 8],
}

impl BinaryData for RawMesh {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawAttachment {
    pub name_index: BinOffset,
    pub flags: u32,
    pub local_bone: i32,
    pub local: [f32; 12], // attachment point, 3x4 row major
    unused: [i32; 8],
}

impl BinaryData for RawAttachment {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawAnimDesc {
    base_ptr: i32,
    pub name_index: BinOffset,
    pub fps: f32,
    pub flags: i32,
    pub frame_count: i32,
    pub movement_count: i32,
    pub movement_index: i32,
    pub ikrule_zeroframe_index: i32,
    unused1: [i32; 5],
    pub anim_block: i32, // non-zero: data lives in an external animation block
    pub anim_index: i32, // relative to this record
    pub ikrule_count: i32,
    pub ikrule_index: i32,
    pub anim_block_ikrule_index: i32,
    pub local_hierarchy_count: i32,
    pub local_hierarchy_index: i32,
    pub section_index: i32,
    pub section_frame_count: i32,
    pub zeroframe_span: i16,
    pub zeroframe_count: i16,
    pub zeroframe_index: i32,
    pub zeroframe_stall_time: f32,
}

impl BinaryData for RawAnimDesc {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct RawAnimBlock {
    pub data_start: i32,
    pub data_end: i32,
}

impl BinaryData for RawAnimBlock {}

/// A bone with its bind transform resolved out of the raw table.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: i32,
    pub pos: Vec3,
    pub quat: Quat,
    pub rot: Vec3,
    pub pos_scale: Vec3,
    pub rot_scale: Vec3,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdlTexture {
    pub name: String,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub material: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub vertex_count: i32,
    pub vertex_index: i32,
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub flags: u32,
    pub local_bone: i32,
    pub local: [f32; 12],
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimDesc {
    pub name: String,
    pub fps: f32,
    pub flags: FlagSet<AnimDescFlags>,
    pub frame_count: i32,
    pub data: AnimData,
}

#[derive(Debug)]
pub struct Mdl {
    pub header: MdlHeader,
    pub bones: Vec<Bone>,
    pub animations: Vec<AnimDesc>,
    pub body_parts: Vec<BodyPart>,
    pub textures: Vec<MdlTexture>,
    pub texture_dirs: Vec<String>,
    pub skin_families: Vec<Vec<u16>>,
    pub attachments: Vec<Attachment>,
    pub surface_prop: String,
    /// Per-record problems that did not abort the decode.
    pub diagnostics: Vec<SourceError>,
}

impl Mdl {
    /// Decode a full model header file. Table reads are strictly sequential
    /// (header, bones, animation descriptors, body parts, the rest); a
    /// failure in any required table aborts the whole decode since the
    /// companion-file loaders assume full structural integrity.
    pub fn read(data: &[u8]) -> Result<Mdl> {
        let mut cursor = VCursor::new(data);
        let header = MdlHeader::read(&mut cursor)?;
        let mut diagnostics = Vec::new();

        let id = header.id;
        if id != MDL_MAGIC {
            return Err(SourceError::InvalidEncoding {
                file: "mdl",
                what: format!("magic {:?}, expected {:?}", id, MDL_MAGIC),
            });
        }
        let version = header.version;
        // 49 moved the strip group layout in the companion topology file;
        // until that is handled end to end, refuse rather than mis-read.
        if !(44..=48).contains(&version) {
            return Err(SourceError::UnsupportedFeature {
                file: "mdl",
                what: format!("studiohdr version {}", version),
            });
        }

        let bones = read_bones(&mut cursor, &header)?;
        let animations = read_animations(&mut cursor, &header, &bones, &mut diagnostics)?;
        let body_parts = read_body_parts(&mut cursor, &header)?;

        let mut textures = Vec::new();
        for (at, raw) in header.texture.read(&mut cursor, 0)? {
            textures.push(MdlTexture {
                name: raw.name_index.read_str(&mut cursor, at)?,
                flags: raw.flags,
            });
        }

        let mut texture_dirs = Vec::new();
        for (_, offset) in header.texture_dir.read(&mut cursor, 0)? {
            // each entry is itself an offset from the file start
            texture_dirs.push(offset.read_str(&mut cursor, 0)?.replace('\\', "/"));
        }

        let skin_families = read_skin_families(&mut cursor, &header)?;

        let mut attachments = Vec::new();
        for (at, raw) in header.attachment.read(&mut cursor, 0)? {
            attachments.push(Attachment {
                name: raw.name_index.read_str(&mut cursor, at)?,
                flags: raw.flags,
                local_bone: raw.local_bone,
                local: raw.local,
            });
        }

        let surface_prop = header.surface_prop_index.read_str(&mut cursor, 0)?;

        Ok(Mdl {
            header,
            bones,
            animations,
            body_parts,
            textures,
            texture_dirs,
            skin_families,
            attachments,
            surface_prop,
            diagnostics,
        })
    }

    pub fn name(&self) -> &str {
        self.header.name.to_str()
    }
}

fn read_bones(cursor: &mut VCursor, header: &MdlHeader) -> Result<Vec<Bone>> {
    let mut bones = Vec::with_capacity(header.bone.count());
    for (i, (at, raw)) in header.bone.read(cursor, 0)?.into_iter().enumerate() {
        let parent = raw.parent;
        // Parents must come before children: the table is topologically
        // sorted by the compiler, and later decode stages (and consumers
        // walking the tree) rely on it. Anything else is a broken file.
        if parent >= i as i32 || parent < -1 {
            return Err(SourceError::MalformedHierarchy {
                file: "mdl",
                index: i,
                parent,
            });
        }
        bones.push(Bone {
            name: raw.name_index.read_str(cursor, at)?,
            parent,
            pos: raw.pos,
            quat: raw.quat,
            rot: raw.rot,
            pos_scale: raw.pos_scale,
            rot_scale: raw.rot_scale,
            flags: raw.flags,
        });
    }
    Ok(bones)
}

fn read_animations(
    cursor: &mut VCursor,
    header: &MdlHeader,
    bones: &[Bone],
    diagnostics: &mut Vec<SourceError>,
) -> Result<Vec<AnimDesc>> {
    let mut animations = Vec::with_capacity(header.local_anim.count());
    for (at, raw) in header.local_anim.read(cursor, 0)? {
        let name = raw.name_index.read_str(cursor, at)?;
        let flags = FlagSet::<AnimDescFlags>::new_truncated(raw.flags as u32);

        let data = if flags.contains(AnimDescFlags::FRAMEANIM) {
            // Known format variant with no decoder; refusing beats guessing.
            diagnostics.push(SourceError::UnsupportedFeature {
                file: "mdl",
                what: format!("frame-animation data in sequence \"{}\"", name),
            });
            AnimData::Unsupported
        } else {
            match anim::read_anim_data(cursor, at, &raw, bones) {
                Ok(data) => data,
                Err(err) => {
                    // one bad descriptor does not sink the model
                    diagnostics.push(err);
                    AnimData::Unsupported
                }
            }
        };

        animations.push(AnimDesc {
            name,
            fps: raw.fps,
            flags,
            frame_count: raw.frame_count,
            data,
        });
    }
    Ok(animations)
}

fn read_body_parts(cursor: &mut VCursor, header: &MdlHeader) -> Result<Vec<BodyPart>> {
    let mut body_parts = Vec::with_capacity(header.body_part.count());
    for (at, raw) in header.body_part.read(cursor, 0)? {
        let num_models = raw.num_models;
        let mut models = Vec::new();
        let model_records =
            raw.model_index
                .read_array::<RawModel>(cursor, at, num_models.max(0) as usize)?;
        for (model_at, raw_model) in model_records {
            let mut meshes = Vec::new();
            for (_, raw_mesh) in raw_model.meshes.read(cursor, model_at)? {
                meshes.push(Mesh {
                    material: raw_mesh.material,
                    vertex_count: raw_mesh.num_vertices,
                    vertex_offset: raw_mesh.vertex_offset,
                });
            }
            models.push(Model {
                name: raw_model.name.to_string(),
                vertex_count: raw_model.num_vertices,
                vertex_index: raw_model.vertex_index,
                meshes,
            });
        }
        body_parts.push(BodyPart {
            name: raw.name_index.read_str(cursor, at)?,
            base: raw.base,
            models,
        });
    }
    Ok(body_parts)
}

fn read_skin_families(cursor: &mut VCursor, header: &MdlHeader) -> Result<Vec<Vec<u16>>> {
    let families = header.skin_family_count;
    let families = families.max(0) as usize;
    let references = header.skin_reference_count;
    let references = references.max(0) as usize;
    let table: Box<[u16]> =
        header
            .skin_reference_index
            .read_pod_slice(cursor, 0, families * references)?;
    Ok(table.chunks(references.max(1)).map(|c| c.to_vec()).collect())
}
