// The standard class table: which capability bases each entity class
// composes, in merge order. This covers the classes the importer places in
// a scene; anything absent still decodes with its raw pairs intact.

use super::mixins::*;
use super::SchemaRegistry;

impl SchemaRegistry {
    pub fn standard() -> SchemaRegistry {
        let mut r = SchemaRegistry::new();

        r.register("worldspawn", vec![TARGETNAME, WORLDSPAWN]);

        r.register("light", vec![TARGETNAME, PARENTNAME, ORIGIN, LIGHT]);
        r.register(
            "light_spot",
            vec![TARGETNAME, PARENTNAME, ORIGIN, ANGLES, LIGHT],
        );
        r.register("light_environment", vec![ORIGIN, ANGLES, LIGHT]);

        r.register("info_player_start", vec![TARGETNAME, ORIGIN, ANGLES]);
        r.register("info_target", vec![TARGETNAME, PARENTNAME, ORIGIN, ANGLES]);
        r.register("info_particle_system", vec![TARGETNAME, PARENTNAME, ORIGIN, ANGLES]);

        r.register("prop_static", vec![ORIGIN, ANGLES, STUDIOMODEL, SHADOW]);
        r.register(
            "prop_physics",
            vec![TARGETNAME, ORIGIN, ANGLES, STUDIOMODEL, RENDER_FIELDS, SHADOW, GLOBAL],
        );
        r.register(
            "prop_dynamic",
            vec![
                TARGETNAME,
                PARENTNAME,
                ORIGIN,
                ANGLES,
                STUDIOMODEL,
                RENDER_FIELDS,
                SHADOW,
                ENABLE_DISABLE,
            ],
        );
        r.register(
            "prop_ragdoll",
            vec![TARGETNAME, ORIGIN, ANGLES, STUDIOMODEL, RENDER_FIELDS, SHADOW],
        );

        r.register(
            "func_door",
            vec![TARGETNAME, PARENTNAME, ORIGIN, RENDER_FIELDS, GLOBAL],
        );
        r.register(
            "func_brush",
            vec![TARGETNAME, PARENTNAME, ORIGIN, RENDER_FIELDS, ENABLE_DISABLE, GLOBAL],
        );
        r.register(
            "trigger_multiple",
            vec![TARGETNAME, PARENTNAME, ORIGIN, ENABLE_DISABLE],
        );
        r.register(
            "env_sprite",
            vec![TARGETNAME, PARENTNAME, ORIGIN, RENDER_FIELDS],
        );

        r
    }
}
