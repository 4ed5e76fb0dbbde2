// Session reconstruction over a decoded element graph.
//
// Animation sets carry no declared entity kind; the convention is
// structural: a set with a `gameModel` reference drives a model, `camera`
// a camera, `light` a light. Transform data hangs off controls found by
// (name, type) scans, and orientations come back as quaternions that the
// host wants as Euler degrees.

use glam::{Quat, Vec3};

use crate::dmx::{DmxDocument, DmxElement, DmxHandle};
use crate::error::{Result, SourceError};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEntityKind {
    Camera,
    Light,
    Model { model_path: String },
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntity {
    pub name: String,
    pub kind: SessionEntityKind,
    pub position: Option<Vec3>,
    pub orientation: Option<Quat>,
    /// The orientation as XYZ Euler degrees, the form the host consumes.
    pub orientation_euler: Option<Vec3>,
    pub color: Option<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub map_name: String,
    pub entities: Vec<SessionEntity>,
}

impl Session {
    /// Walk the clip tree down to the animation sets:
    /// `activeClip -> subClipTrackGroup -> tracks[0] -> children[0]`.
    pub fn parse(doc: &DmxDocument) -> Result<Session> {
        let root = doc
            .root
            .and_then(|h| doc.get(h))
            .ok_or_else(|| SourceError::InvalidEncoding {
                file: "dmx",
                what: "document has no root element".to_owned(),
            })?;

        let active_clip = follow(doc, root, "activeClip")?;
        let map_name = active_clip.text("mapname").unwrap_or_default().to_owned();

        let track_group = follow(doc, active_clip, "subClipTrackGroup")?;
        let track = first(doc, track_group, "tracks")?;
        let film_clip = first(doc, track, "children")?;

        let mut entities = Vec::new();
        for handle in film_clip.elements("animationSets").iter().flatten() {
            let Some(set) = doc.get(*handle) else {
                continue;
            };
            entities.push(classify(doc, set));
        }

        Ok(Session { map_name, entities })
    }
}

fn follow<'a>(doc: &'a DmxDocument, from: &DmxElement, name: &str) -> Result<&'a DmxElement> {
    from.element(name)
        .and_then(|h| doc.get(h))
        .ok_or_else(|| SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("element \"{}\" is missing \"{}\"", from.name, name),
        })
}

fn first<'a>(doc: &'a DmxDocument, from: &DmxElement, name: &str) -> Result<&'a DmxElement> {
    from.elements(name)
        .iter()
        .flatten()
        .next()
        .and_then(|h| doc.get(*h))
        .ok_or_else(|| SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("element \"{}\" has an empty \"{}\"", from.name, name),
        })
}

fn classify(doc: &DmxDocument, set: &DmxElement) -> SessionEntity {
    let kind = if set.has("gameModel") {
        let model_path = set
            .element("gameModel")
            .and_then(|h| doc.get(h))
            .and_then(|m| m.text("modelName"))
            .unwrap_or_default()
            .to_owned();
        SessionEntityKind::Model { model_path }
    } else if set.has("camera") {
        SessionEntityKind::Camera
    } else if set.has("light") {
        SessionEntityKind::Light
    } else {
        SessionEntityKind::Generic
    };

    // models animate from the root, everything else from its transform
    let transform = match kind {
        SessionEntityKind::Model { .. } => {
            find_control(doc, set, "rootTransform", "DmeTransformControl")
        }
        _ => find_control(doc, set, "transform", "DmeTransformControl")
            .or_else(|| find_control(doc, set, "rootTransform", "DmeTransformControl")),
    };

    let position = transform
        .and_then(|t| channel_value(doc, t, "positionChannel"))
        .and_then(|attr| attr.vec3_value())
        .map(Vec3::from_array);
    let orientation = transform
        .and_then(|t| channel_value(doc, t, "orientationChannel"))
        .and_then(|attr| attr.quat_value())
        .map(|q| Quat::from_xyzw(q[0], q[1], q[2], q[3]));

    let color = light_color(doc, set, &kind);

    SessionEntity {
        name: set.name.clone(),
        orientation_euler: orientation.map(quaternion_to_euler_degrees),
        kind,
        position,
        orientation,
        color,
    }
}

/// Linear scan of the set's control list matching on (name, type).
fn find_control<'a>(
    doc: &'a DmxDocument,
    set: &DmxElement,
    name: &str,
    type_name: &str,
) -> Option<&'a DmxElement> {
    set.elements("controls")
        .iter()
        .flatten()
        .filter_map(|h| doc.get(*h))
        .find(|e| e.name == name && e.type_name == type_name)
}

/// A channel indirects to its source: `fromElement` names the element and
/// `fromAttribute` names which of its attributes holds the value.
fn channel_value<'a>(
    doc: &'a DmxDocument,
    transform: &DmxElement,
    channel: &str,
) -> Option<ChannelAttr<'a>> {
    let channel = doc.get(transform.element(channel)?)?;
    let from = doc.get(channel.element("fromElement")?)?;
    let attribute = channel.text("fromAttribute")?;
    Some(ChannelAttr {
        element: from,
        attribute: attribute.to_owned(),
    })
}

struct ChannelAttr<'a> {
    element: &'a DmxElement,
    attribute: String,
}

impl ChannelAttr<'_> {
    fn vec3_value(&self) -> Option<[f32; 3]> {
        self.element.vec3(&self.attribute)
    }

    fn quat_value(&self) -> Option<[f32; 4]> {
        self.element.quat(&self.attribute)
    }
}

fn light_color(
    doc: &DmxDocument,
    set: &DmxElement,
    kind: &SessionEntityKind,
) -> Option<[f32; 3]> {
    if *kind != SessionEntityKind::Light {
        return None;
    }
    let channel = |name: &str| -> Option<f32> {
        find_control(doc, set, name, "DmElement")?.float("value")
    };
    Some([
        channel("color_red")?,
        channel("color_green")?,
        channel("color_blue")?,
    ])
}

/// Fixed XYZ convention, in degrees, with the asin input clamped so that
/// numerically overshooting quaternions cannot produce NaN pitch.
pub fn quaternion_to_euler_degrees(q: Quat) -> Vec3 {
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);

    let t0 = 2.0 * (w * x + y * z);
    let t1 = 1.0 - 2.0 * (x * x + y * y);
    let nx = t0.atan2(t1).to_degrees();

    let t2 = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
    let ny = t2.asin().to_degrees();

    let t3 = 2.0 * (w * z + x * y);
    let t4 = 1.0 - 2.0 * (y * y + z * z);
    let nz = t3.atan2(t4).to_degrees();

    Vec3::new(nx, ny, nz)
}
