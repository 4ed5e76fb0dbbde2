// The capability bases entity classes compose. Each reads the keys it owns
// and ignores the rest; parse problems land in the diagnostics list and the
// attribute is simply not set.

use crate::bsp::entities::RawEntity;
use crate::error::SourceError;

use super::{parse_bool, parse_color, parse_number, parse_vec3, AttrSet, AttrValue, Mixin};

pub const TARGETNAME: Mixin = Mixin {
    name: "Targetname",
    parse: targetname,
};
pub const PARENTNAME: Mixin = Mixin {
    name: "Parentname",
    parse: parentname,
};
pub const ORIGIN: Mixin = Mixin {
    name: "Origin",
    parse: origin,
};
pub const ANGLES: Mixin = Mixin {
    name: "Angles",
    parse: angles,
};
pub const RENDER_FIELDS: Mixin = Mixin {
    name: "RenderFields",
    parse: render_fields,
};
pub const LIGHT: Mixin = Mixin {
    name: "Light",
    parse: light,
};
pub const SHADOW: Mixin = Mixin {
    name: "Shadow",
    parse: shadow,
};
pub const STUDIOMODEL: Mixin = Mixin {
    name: "Studiomodel",
    parse: studiomodel,
};
pub const ENABLE_DISABLE: Mixin = Mixin {
    name: "EnableDisable",
    parse: enable_disable,
};
pub const GLOBAL: Mixin = Mixin {
    name: "Global",
    parse: global,
};
pub const WORLDSPAWN: Mixin = Mixin {
    name: "Worldspawn",
    parse: worldspawn,
};

fn set_str(raw: &RawEntity, attrs: &mut AttrSet, key: &str) {
    if let Some(v) = raw.get(key) {
        attrs.set(key, AttrValue::Str(v.to_owned()));
    }
}

fn set_number(raw: &RawEntity, attrs: &mut AttrSet, key: &str) {
    if let Some(v) = raw.get(key) {
        if let Some(n) = parse_number(v) {
            attrs.set(key, n);
        }
    }
}

fn set_bool(raw: &RawEntity, attrs: &mut AttrSet, key: &str) {
    if let Some(v) = raw.get(key) {
        attrs.set(key, AttrValue::Bool(parse_bool(v)));
    }
}

fn set_vec3(
    raw: &RawEntity,
    attrs: &mut AttrSet,
    diagnostics: &mut Vec<SourceError>,
    key: &str,
) {
    if let Some(v) = raw.get(key) {
        match parse_vec3(v) {
            Ok(vec) => attrs.set(key, AttrValue::Vec3(vec)),
            Err(err) => diagnostics.push(err),
        }
    }
}

fn set_color(
    raw: &RawEntity,
    attrs: &mut AttrSet,
    diagnostics: &mut Vec<SourceError>,
    key: &str,
) {
    if let Some(v) = raw.get(key) {
        match parse_color(v) {
            Ok(color) => attrs.set(key, AttrValue::Color(color)),
            Err(err) => diagnostics.push(err),
        }
    }
}

fn targetname(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_str(raw, attrs, "targetname");
}

fn parentname(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_str(raw, attrs, "parentname");
}

fn origin(raw: &RawEntity, attrs: &mut AttrSet, diagnostics: &mut Vec<SourceError>) {
    set_vec3(raw, attrs, diagnostics, "origin");
}

fn angles(raw: &RawEntity, attrs: &mut AttrSet, diagnostics: &mut Vec<SourceError>) {
    set_vec3(raw, attrs, diagnostics, "angles");
}

fn render_fields(raw: &RawEntity, attrs: &mut AttrSet, diagnostics: &mut Vec<SourceError>) {
    set_number(raw, attrs, "rendermode");
    set_number(raw, attrs, "renderfx");
    set_number(raw, attrs, "renderamt");
    set_color(raw, attrs, diagnostics, "rendercolor");
}

fn light(raw: &RawEntity, attrs: &mut AttrSet, diagnostics: &mut Vec<SourceError>) {
    set_color(raw, attrs, diagnostics, "_light");
    set_color(raw, attrs, diagnostics, "_lighthdr");
    set_number(raw, attrs, "_lightscalehdr");
    set_number(raw, attrs, "style");
    set_number(raw, attrs, "_fifty_percent_distance");
    set_number(raw, attrs, "_zero_percent_distance");
}

fn shadow(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_bool(raw, attrs, "disableshadows");
    set_bool(raw, attrs, "disablereceiveshadows");
}

fn studiomodel(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_str(raw, attrs, "model");
    set_number(raw, attrs, "skin");
    set_number(raw, attrs, "modelscale");
    set_number(raw, attrs, "body");
}

fn enable_disable(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_bool(raw, attrs, "startdisabled");
}

fn global(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_str(raw, attrs, "globalname");
}

fn worldspawn(raw: &RawEntity, attrs: &mut AttrSet, _: &mut Vec<SourceError>) {
    set_str(raw, attrs, "skyname");
    set_str(raw, attrs, "detailmaterial");
    set_number(raw, attrs, "maxpropscreenwidth");
}
