//! Offline bootstrap catalog.
//!
//! The real `IMC.xml` is a large external resource (hundreds of message
//! types) normally fetched from the LSTS schema repository — out of
//! scope for this runtime to auto-download (see `SPEC_FULL.md` §8). This
//! module hand-builds a representative subset — the minimal set every
//! dispatcher depends on for peer discovery, plus the handful of
//! messages exercised by `original_source/example/followRef.py` — so the
//! crate is fully testable offline. It is additive to, not a substitute
//! for, [`super::xml::load`].

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Catalog, EnumDef, FieldDescriptor, MessageDescriptor, PrimitiveKind, Unit};

const SYNC_WORD: u16 = 0xFE54;

fn field(name: &str, abbrev: &str, kind: PrimitiveKind, description: &str) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        abbrev: abbrev.to_string(),
        kind,
        unit: Unit::None,
        min: None,
        max: None,
        enum_def: None,
        message_type: None,
        description: description.to_string(),
    }
}

fn ranged(mut f: FieldDescriptor, min: f64, max: f64) -> FieldDescriptor {
    f.min = Some(min);
    f.max = Some(max);
    f
}

fn enumerated(mut f: FieldDescriptor, def: &Arc<EnumDef>) -> FieldDescriptor {
    f.unit = Unit::Enumerated;
    f.enum_def = Some(def.clone());
    f
}

fn bitfield(mut f: FieldDescriptor, def: &Arc<EnumDef>) -> FieldDescriptor {
    f.unit = Unit::Bitfield;
    f.enum_def = Some(def.clone());
    f
}

fn of_message_type(mut f: FieldDescriptor, abbrev: &str) -> FieldDescriptor {
    f.message_type = Some(abbrev.to_string());
    f
}

fn enum_def(name: &str, prefix: &str, is_bitfield: bool, symbols: &[(&str, i64)]) -> Arc<EnumDef> {
    let mut map = IndexMap::new();
    if is_bitfield {
        map.insert("EMPTY".to_string(), 0);
    }
    for (symbol, value) in symbols {
        map.insert(super::sanitize_symbol(symbol), *value);
    }
    Arc::new(EnumDef {
        name: name.to_string(),
        prefix: prefix.to_string(),
        is_bitfield,
        symbols: map,
    })
}

fn message(
    id: u16,
    abbrev: &str,
    name: &str,
    category: &str,
    description: &str,
    fields: Vec<FieldDescriptor>,
) -> MessageDescriptor {
    let mut map = IndexMap::new();
    for f in fields {
        map.insert(f.abbrev.clone(), f);
    }
    MessageDescriptor {
        id,
        abbrev: abbrev.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        fields: map,
    }
}

/// Builds the offline bootstrap catalog.
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::empty(SYNC_WORD);

    let entity_list_op = enum_def("EntityList.OperationEnum", "", false, &[("REPORT", 0), ("QUERY", 1)]);
    catalog
        .global_enums
        .insert("EntityList.OperationEnum".to_string(), entity_list_op.clone());

    let plan_control_type = enum_def(
        "PlanControl.TypeEnum",
        "PC",
        false,
        &[("REQUEST", 0), ("SUCCESS", 1), ("FAILURE", 2), ("IN_PROGRESS", 3)],
    );
    let plan_control_op = enum_def(
        "PlanControl.OperationEnum",
        "PC",
        false,
        &[("START", 0), ("STOP", 1), ("LOAD", 2), ("GET", 3)],
    );
    let plan_control_flags = enum_def(
        "PlanControl.FlagsBitfield",
        "FLG",
        true,
        &[("CALIBRATE", 0x01), ("IGNORE_ERRORS", 0x02)],
    );
    let speed_units = enum_def(
        "DesiredSpeed.SpeedUnitsEnum",
        "SUNITS",
        false,
        &[("METERS_PS", 0), ("PERCENTAGE", 1), ("RPM", 2)],
    );
    let z_units = enum_def(
        "DesiredZ.ZUnitsEnum",
        "Z",
        false,
        &[("DEPTH", 0), ("ALTITUDE", 1), ("HEIGHT", 2)],
    );
    let reference_flags = enum_def(
        "Reference.FlagsBitfield",
        "FLAG",
        true,
        &[
            ("LOCATION", 0x01),
            ("SPEED", 0x02),
            ("Z", 0x04),
            ("START_POINT", 0x08),
            ("DIRECT", 0x10),
            ("MANDONE", 0x20),
        ],
    );
    let follow_ref_state = enum_def(
        "FollowRefState.StateEnum",
        "",
        false,
        &[
            ("WAIT", 0),
            ("GOTO", 1),
            ("LOITER", 2),
            ("HOVER", 3),
            ("ELEVATOR", 4),
            ("TIMEOUT", 5),
        ],
    );
    let proximity_flags = enum_def(
        "FollowRefState.ProximityBitfield",
        "PROX",
        true,
        &[("FAR_FROM_TARGET", 0x01), ("ALTITUDE_NEAR_TARGET", 0x02), ("POS_NEAR_TARGET", 0x04)],
    );

    catalog.insert(message(
        150,
        "Heartbeat",
        "Heartbeat",
        "Plumbing",
        "Periodic signal that a system is alive.",
        vec![],
    ));

    catalog.insert(message(250, "Abort", "Abort", "Plumbing", "Immediately abort mission execution.", vec![]));

    catalog.insert(message(
        251,
        "EntityState",
        "EntityState",
        "Plumbing",
        "Periodic announcement of entity state.",
        vec![
            field("State", "state", PrimitiveKind::UInt8, "The state of the entity."),
            field("Description", "description", PrimitiveKind::PlainText, "Human-readable description."),
        ],
    ));
    catalog.insert(message(
        252,
        "QueryEntityState",
        "QueryEntityState",
        "Plumbing",
        "Request the state of an entity.",
        vec![],
    ));

    catalog.insert(message(
        253,
        "EntityInfo",
        "EntityInfo",
        "Plumbing",
        "Information about one entity of the system.",
        vec![
            field("Identifier", "id", PrimitiveKind::UInt8, "Numeric identifier of the entity."),
            field("Label", "label", PrimitiveKind::PlainText, "Human-readable label of the entity."),
            field("Component", "component", PrimitiveKind::PlainText, "Name of the software component."),
            field("Active", "act_time", PrimitiveKind::PlainText, "Activation time."),
            field("Deactivation", "deact_time", PrimitiveKind::PlainText, "Deactivation time."),
        ],
    ));
    catalog.insert(message(
        254,
        "QueryEntityInfo",
        "QueryEntityInfo",
        "Plumbing",
        "Request information about an entity.",
        vec![field("Identifier", "id", PrimitiveKind::UInt8, "Numeric identifier of the entity.")],
    ));

    catalog.insert(message(
        255,
        "EntityList",
        "EntityList",
        "Plumbing",
        "Presents a list of on-board entities, or requests one.",
        vec![
            enumerated(
                field("Operation", "op", PrimitiveKind::UInt8, "The operation to perform."),
                &entity_list_op,
            ),
            field(
                "Entities",
                "list",
                PrimitiveKind::PlainText,
                "Comma-separated `label=id` pairs, present for the REPORT operation.",
            ),
        ],
    ));

    catalog.insert(message(
        256,
        "EntityActivationState",
        "EntityActivationState",
        "Plumbing",
        "Activation state of an entity.",
        vec![field("State", "state", PrimitiveKind::UInt8, "Activation state.")],
    ));
    catalog.insert(message(
        257,
        "QueryEntityActivationState",
        "QueryEntityActivationState",
        "Plumbing",
        "Request the activation state of an entity.",
        vec![],
    ));

    catalog.insert(message(
        152,
        "Announce",
        "Announce",
        "Plumbing",
        "Periodic system announcement used for discovery.",
        vec![
            field("System Name", "sys_name", PrimitiveKind::PlainText, "Name of the announcing system."),
            field("System Type", "sys_type", PrimitiveKind::UInt8, "Category of the announcing system."),
            field("Owner", "owner", PrimitiveKind::UInt16, "Identifier of the system's owner."),
            field("Latitude", "lat", PrimitiveKind::Fp64, "Reference WGS-84 latitude, radians."),
            field("Longitude", "lon", PrimitiveKind::Fp64, "Reference WGS-84 longitude, radians."),
            field("Height", "height", PrimitiveKind::Fp64, "Reference WGS-84 height, meters."),
            field("Services", "services", PrimitiveKind::PlainText, "Semicolon-separated list of provided services."),
        ],
    ));
    catalog.insert(message(
        153,
        "AnnounceService",
        "AnnounceService",
        "Plumbing",
        "Announces a service provided by the system.",
        vec![
            field("Service", "service", PrimitiveKind::PlainText, "URI of the announced service."),
            field("Service Type", "service_type", PrimitiveKind::UInt8, "Kind of service."),
        ],
    ));

    catalog.insert(message(
        180,
        "Temperature",
        "Temperature",
        "Sensor Data",
        "Temperature reading.",
        vec![field("Value", "value", PrimitiveKind::Fp32, "Temperature, degrees Celsius.")],
    ));

    catalog.insert(message(
        563,
        "DesiredSpeed",
        "Desired Speed",
        "Control",
        "Desired speed reference.",
        vec![
            field("Value", "value", PrimitiveKind::Fp32, "Desired speed value."),
            enumerated(
                field("Speed Units", "speed_units", PrimitiveKind::UInt8, "Units of the speed value."),
                &speed_units,
            ),
        ],
    ));
    catalog.insert(message(
        564,
        "DesiredZ",
        "Desired Z",
        "Control",
        "Desired vertical position reference.",
        vec![
            field("Value", "value", PrimitiveKind::Fp32, "Desired Z value."),
            enumerated(field("Z Units", "z_units", PrimitiveKind::UInt8, "Units of the Z value."), &z_units),
        ],
    ));
    catalog.insert(message(
        562,
        "Reference",
        "Reference",
        "Control",
        "Vehicle reference for heading, speed, altitude/depth.",
        vec![
            bitfield(field("Flags", "flags", PrimitiveKind::UInt8, "Which optional fields are present."), &reference_flags),
            ranged(field("Latitude", "lat", PrimitiveKind::Fp64, "WGS-84 latitude, radians."), -1.5708, 1.5708),
            field("Longitude", "lon", PrimitiveKind::Fp64, "WGS-84 longitude, radians."),
            field("Radius", "radius", PrimitiveKind::Fp32, "Radius of the loitering circle, meters."),
            of_message_type(field("Speed", "speed", PrimitiveKind::Message, "Desired speed."), "DesiredSpeed"),
            of_message_type(field("Z", "z", PrimitiveKind::Message, "Desired vertical position."), "DesiredZ"),
        ],
    ));
    catalog.insert(message(
        561,
        "FollowReference",
        "Follow Reference Maneuver",
        "Maneuvering",
        "Causes the vehicle to follow an externally-supplied Reference message.",
        vec![
            field("Control Source", "control_src", PrimitiveKind::UInt16, "System allowed to supply references."),
            field("Control Entity", "control_ent", PrimitiveKind::UInt8, "Entity allowed to supply references."),
            field("Timeout", "timeout", PrimitiveKind::Fp32, "Reference timeout, seconds."),
            field("Loiter Radius", "loiter_radius", PrimitiveKind::Fp32, "Radius used when loitering, meters."),
            field("Altitude Interval", "altitude_interval", PrimitiveKind::Fp32, "Admissible altitude interval, meters."),
        ],
    ));
    catalog.insert(message(
        551,
        "FollowRefState",
        "Follow Reference State",
        "Maneuvering",
        "Reports the internal state of an active FollowReference maneuver.",
        vec![
            field("Control Source", "control_src", PrimitiveKind::UInt16, "System supplying references."),
            field("Control Entity", "control_ent", PrimitiveKind::UInt8, "Entity supplying references."),
            of_message_type(
                field("Reference", "reference", PrimitiveKind::Message, "Most recently accepted reference."),
                "Reference",
            ),
            enumerated(field("State", "state", PrimitiveKind::UInt8, "Current maneuver state."), &follow_ref_state),
            bitfield(
                field("Proximity", "proximity", PrimitiveKind::UInt8, "Proximity to the reference."),
                &proximity_flags,
            ),
        ],
    ));

    catalog.insert(message(
        350,
        "EstimatedState",
        "Estimated State",
        "Navigation",
        "Estimated vehicle state.",
        vec![
            field("Latitude (WGS-84)", "lat", PrimitiveKind::Fp64, "WGS-84 reference latitude, radians."),
            field("Longitude (WGS-84)", "lon", PrimitiveKind::Fp64, "WGS-84 reference longitude, radians."),
            field("Height (WGS-84)", "height", PrimitiveKind::Fp64, "WGS-84 reference height, meters."),
            field("Offset north (x)", "x", PrimitiveKind::Fp32, "North offset, meters."),
            field("Offset east (y)", "y", PrimitiveKind::Fp32, "East offset, meters."),
            field("Offset down (z)", "z", PrimitiveKind::Fp32, "Down offset, meters."),
            field("Rotation over x axis (phi)", "phi", PrimitiveKind::Fp32, "Roll angle, radians."),
            field("Rotation over y axis (theta)", "theta", PrimitiveKind::Fp32, "Pitch angle, radians."),
            field("Rotation over z axis (psi)", "psi", PrimitiveKind::Fp32, "Yaw angle, radians."),
            field("Body-Fixed xx Velocity (u)", "u", PrimitiveKind::Fp32, "Forward body velocity, m/s."),
            field("Body-Fixed yy Velocity (v)", "v", PrimitiveKind::Fp32, "Sideways body velocity, m/s."),
            field("Body-Fixed zz Velocity (w)", "w", PrimitiveKind::Fp32, "Downward body velocity, m/s."),
        ],
    ));

    let plan_control_flags_desc = field(
        "Flags",
        "flags",
        PrimitiveKind::UInt8,
        "Bitfield of plan control flags.",
    );
    catalog.insert(message(
        550,
        "PlanControl",
        "Plan Control",
        "Plan DB",
        "Controls plan execution (start/stop/load/get).",
        vec![
            enumerated(field("Type", "type", PrimitiveKind::UInt8, "Kind of request/reply."), &plan_control_type),
            enumerated(field("Operation", "op", PrimitiveKind::UInt8, "Operation to perform."), &plan_control_op),
            field("Request ID", "request_id", PrimitiveKind::UInt16, "Request identifier, echoed in replies."),
            field("Plan Identifier", "plan_id", PrimitiveKind::PlainText, "Identifier of the target plan."),
            bitfield(plan_control_flags_desc, &plan_control_flags),
            of_message_type(
                field("Arguments", "arg", PrimitiveKind::Message, "Maneuver-specific arguments, e.g. a FollowReference."),
                "FollowReference",
            ),
            field("Info", "info", PrimitiveKind::PlainText, "Human-readable information about the request/reply."),
        ],
    ));

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_set_is_present() {
        let catalog = catalog();
        for abbrev in super::super::MINIMAL_SET {
            assert!(catalog.by_abbrev(abbrev).is_some(), "missing {abbrev}");
        }
    }

    #[test]
    fn heartbeat_id_matches_spec_scenario() {
        let catalog = catalog();
        assert_eq!(catalog.by_abbrev("Heartbeat").unwrap().id, 150);
    }
}
