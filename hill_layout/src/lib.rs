//! Hill description files and their expansion into a physics world.
#![forbid(unsafe_code)]

use std::fmt;
use std::fs;
use std::path::Path;

use physics_env::{PhysicsWorld, SurfaceLayer};
use rapier3d::math::Vector;
use rapier3d::na::{Isometry3, UnitQuaternion};
use rapier3d::prelude::{ColliderBuilder, Real};
use serde::Deserialize;

#[derive(Debug)]
pub enum HillError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for HillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HillError::Io(err) => write!(f, "io error: {}", err),
            HillError::Parse(err) => write!(f, "parse error: {}", err),
            HillError::Invalid(message) => write!(f, "invalid hill: {}", message),
        }
    }
}

impl std::error::Error for HillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HillError::Io(err) => Some(err),
            HillError::Parse(err) => Some(err),
            HillError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for HillError {
    fn from(err: std::io::Error) -> Self {
        HillError::Io(err)
    }
}

impl From<toml::de::Error> for HillError {
    fn from(err: toml::de::Error) -> Self {
        HillError::Parse(err)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HillFile {
    pub version: u32,
    pub name: String,
    pub gate: GateSpec,
    #[serde(default)]
    pub solids: Vec<TrackSolid>,
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct GateSpec {
    pub pos: [Real; 3],
    #[serde(default)]
    pub yaw_deg: Real,
    #[serde(default)]
    pub seat_offset: Option<[Real; 3]>,
    #[serde(default)]
    pub seat_yaw_deg: Real,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TrackSolid {
    pub id: String,
    pub kind: SolidKind,
    pub pos: [Real; 3],
    pub size: [Real; 3],
    #[serde(default)]
    pub yaw_deg: Real,
    /// Pitch of a ramp, degrees; positive descends along its forward (-Z)
    /// axis. Ignored for boxes.
    #[serde(default)]
    pub angle_deg: Real,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    Box,
    Ramp,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Ground,
    Inrun,
}

impl LayerSpec {
    pub fn to_layer(self) -> SurfaceLayer {
        match self {
            LayerSpec::Ground => SurfaceLayer::Ground,
            LayerSpec::Inrun => SurfaceLayer::Inrun,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ZoneSpec {
    pub center: [Real; 3],
    pub radius: Real,
    pub points: u32,
}

impl HillFile {
    pub fn parse_toml(text: &str) -> Result<Self, HillError> {
        let hill: HillFile = toml::from_str(text)?;
        hill.validate()?;
        Ok(hill)
    }

    pub fn load(path: &Path) -> Result<Self, HillError> {
        let text = fs::read_to_string(path)?;
        Self::parse_toml(&text)
    }

    fn validate(&self) -> Result<(), HillError> {
        if self.version != 1 {
            return Err(HillError::Invalid(format!(
                "unsupported version {}",
                self.version
            )));
        }
        for solid in &self.solids {
            if solid.size.iter().any(|s| *s <= 0.0) {
                return Err(HillError::Invalid(format!(
                    "solid {} has a non-positive size",
                    solid.id
                )));
            }
            if solid.layers.is_empty() {
                return Err(HillError::Invalid(format!(
                    "solid {} has no layers",
                    solid.id
                )));
            }
        }
        for (index, zone) in self.zones.iter().enumerate() {
            if zone.radius <= 0.0 {
                return Err(HillError::Invalid(format!(
                    "zone {} has a non-positive radius",
                    index
                )));
            }
        }
        Ok(())
    }

    pub fn gate_position(&self) -> Vector<Real> {
        Vector::new(self.gate.pos[0], self.gate.pos[1], self.gate.pos[2])
    }

    pub fn gate_rotation(&self) -> UnitQuaternion<Real> {
        UnitQuaternion::from_axis_angle(&Vector::y_axis(), self.gate.yaw_deg.to_radians())
    }

    pub fn seat_offset(&self) -> Vector<Real> {
        match self.gate.seat_offset {
            Some([x, y, z]) => Vector::new(x, y, z),
            None => Vector::zeros(),
        }
    }
}

/// Expands a hill file into static colliders. Boxes sit axis-aligned after
/// their yaw; ramps additionally pitch about their local X axis so a
/// positive angle descends along local -Z.
pub fn build_world(hill: &HillFile) -> PhysicsWorld {
    let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
    for solid in &hill.solids {
        let rotation = solid_rotation(solid);
        let position = Vector::new(solid.pos[0], solid.pos[1], solid.pos[2]);
        let collider = ColliderBuilder::cuboid(
            solid.size[0] * 0.5,
            solid.size[1] * 0.5,
            solid.size[2] * 0.5,
        )
        .position(Isometry3::from_parts(position.into(), rotation))
        .build();
        let layers: Vec<SurfaceLayer> = solid.layers.iter().map(|l| l.to_layer()).collect();
        world.insert_surface(collider, &layers);
    }
    world
}

fn solid_rotation(solid: &TrackSolid) -> UnitQuaternion<Real> {
    let yaw = UnitQuaternion::from_axis_angle(&Vector::y_axis(), solid.yaw_deg.to_radians());
    match solid.kind {
        SolidKind::Box => yaw,
        SolidKind::Ramp => {
            // Pitching by -angle about X tilts the top normal toward -Z,
            // so the surface drops away along the travel direction.
            let pitch =
                UnitQuaternion::from_axis_angle(&Vector::x_axis(), -solid.angle_deg.to_radians());
            yaw * pitch
        }
    }
}

/// The built-in practice hill: a 30 degree in-run, a landing slope and a
/// flat outrun carrying three concentric-ish scoring rings. Travel is
/// along -Z from the gate.
pub fn practice_hill() -> HillFile {
    let text = r#"
version = 1
name = "practice"

[gate]
pos = [0.0, 20.3, -0.8]
yaw_deg = 0.0
seat_offset = [0.0, 0.15, 0.0]

[[solids]]
id = "inrun"
kind = "ramp"
pos = [0.0, 12.5, -13.0]
size = [4.0, 1.0, 30.0]
angle_deg = 30.0
layers = ["inrun", "ground"]

[[solids]]
id = "landing_slope"
kind = "ramp"
pos = [0.0, 1.2, -39.7]
size = [12.0, 1.0, 24.0]
angle_deg = 10.0
layers = ["ground"]

[[solids]]
id = "outrun"
kind = "box"
pos = [0.0, 0.0, -70.0]
size = [16.0, 1.0, 44.0]
layers = ["ground"]

[[zones]]
center = [0.0, 0.5, -53.0]
radius = 6.0
points = 30

[[zones]]
center = [0.0, 0.5, -63.0]
radius = 6.0
points = 60

[[zones]]
center = [0.0, 0.5, -73.0]
radius = 6.0
points = 100
"#;
    match HillFile::parse_toml(text) {
        Ok(hill) => hill,
        // The embedded text is covered by tests; a parse failure here is a
        // build defect, not a runtime condition.
        Err(err) => unreachable!("practice hill must parse: {}", err),
    }
}
