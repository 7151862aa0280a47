//! World geometry description and baking into world-space collision triangles.
//!
//! Solids and meshes are flattened into world space, grouped by material and
//! merged per group. A group whose meshes cannot be merged is skipped and
//! logged; the rest of the world still bakes.
#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use collision_world::Triangle;
use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::prelude::Real;
use serde::Deserialize;
use thiserror::Error;

const WORLD_GEOMETRY_VERSION: u32 = 1;
const MAX_RAMP_ANGLE_DEG: Real = 89.0;
const AREA_EPS: Real = 1.0e-10;
const SOLID_ATTRIBUTES: [&str; 2] = ["normal", "position"];

#[derive(Clone, Debug, Deserialize)]
pub struct WorldGeometry {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub solids: Vec<SolidSpec>,
    #[serde(default)]
    pub meshes: Vec<MeshSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SolidSpec {
    pub id: String,
    pub kind: SolidKind,
    pub pos: [f32; 3],
    #[serde(default)]
    pub size: Option<[f32; 3]>,
    #[serde(default)]
    pub length: Option<f32>,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub angle_deg: Option<f32>,
    #[serde(default)]
    pub yaw_deg: Option<f32>,
    #[serde(default = "default_material")]
    pub material: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    Box,
    Ramp,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeshSpec {
    pub id: String,
    #[serde(default = "default_material")]
    pub material: String,
    #[serde(default)]
    pub pos: [f32; 3],
    #[serde(default)]
    pub yaw_deg: Option<f32>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub indices: Option<Vec<u32>>,
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse world geometry: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("world geometry is invalid: {0}")]
    Invalid(String),
    #[error("mesh '{mesh}' has {count} vertices, expected a multiple of 3")]
    VertexCount { mesh: String, count: usize },
    #[error("mesh '{mesh}' has {count} indices, expected a multiple of 3")]
    IndexCount { mesh: String, count: usize },
    #[error("mesh '{mesh}' index {index} out of range ({vertex_count} vertices)")]
    IndexOutOfRange {
        mesh: String,
        index: u32,
        vertex_count: usize,
    },
    #[error("mesh '{mesh}' contains non-finite positions")]
    NonFinite { mesh: String },
    #[error("mesh '{mesh}' attributes must include 'position'")]
    MissingPosition { mesh: String },
    #[error("mesh '{mesh}' scale {scale} must be > 0")]
    InvalidScale { mesh: String, scale: f32 },
    #[error("material '{material}' mixes attribute sets {expected:?} and {found:?}")]
    AttributeMismatch {
        material: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct GeometryValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GeometryValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Merged triangles for one material.
#[derive(Clone, Debug)]
pub struct BakedGroup {
    pub material: String,
    pub attributes: Vec<String>,
    pub triangles: Vec<Triangle>,
}

#[derive(Debug)]
pub struct SkippedGroup {
    pub material: String,
    pub error: GeometryError,
}

#[derive(Debug, Default)]
pub struct BakedWorld {
    pub name: String,
    pub groups: Vec<BakedGroup>,
    pub skipped: Vec<SkippedGroup>,
    pub dropped_degenerate: usize,
}

impl BakedWorld {
    /// Wraps already world-space triangles as a single group.
    pub fn from_triangles(name: impl Into<String>, triangles: Vec<Triangle>) -> Self {
        Self {
            name: name.into(),
            groups: vec![BakedGroup {
                material: default_material(),
                attributes: default_attributes(),
                triangles,
            }],
            skipped: Vec::new(),
            dropped_degenerate: 0,
        }
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.groups
            .iter()
            .flat_map(|group| group.triangles.iter().copied())
    }

    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|group| group.triangles.len()).sum()
    }
}

struct FlatMesh {
    attributes: Vec<String>,
    triangles: Vec<Triangle>,
}

impl WorldGeometry {
    pub fn parse_toml(text: &str) -> Result<Self, GeometryError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeometryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| GeometryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_toml(&text)
    }

    pub fn validate(&self) -> GeometryValidation {
        let mut validation = GeometryValidation::default();
        if self.version != WORLD_GEOMETRY_VERSION {
            validation
                .errors
                .push(format!("unsupported version {}", self.version));
        }
        if self.name.trim().is_empty() {
            validation
                .errors
                .push("world name must not be empty".to_string());
        }
        if self.solids.is_empty() && self.meshes.is_empty() {
            validation
                .warnings
                .push("world contains no solids or meshes".to_string());
        }
        let mut seen = HashSet::new();
        for solid in &self.solids {
            validate_solid(solid, &mut validation);
            if !seen.insert(solid.id.as_str()) {
                validation
                    .errors
                    .push(format!("duplicate geometry id '{}'", solid.id));
            }
        }
        for mesh in &self.meshes {
            validate_mesh(mesh, &mut validation);
            if !seen.insert(mesh.id.as_str()) {
                validation
                    .errors
                    .push(format!("duplicate geometry id '{}'", mesh.id));
            }
        }
        validation
    }

    /// Flattens, groups by material and merges. Structural validation errors
    /// fail the bake; a mesh that cannot be flattened or merged only skips
    /// its material group.
    pub fn bake(&self) -> Result<BakedWorld, GeometryError> {
        let validation = self.validate();
        if !validation.is_ok() {
            return Err(GeometryError::Invalid(validation.errors.join("; ")));
        }
        for warning in &validation.warnings {
            log::warn!("world '{}': {}", self.name, warning);
        }

        let mut by_material: BTreeMap<&str, Vec<Result<FlatMesh, GeometryError>>> =
            BTreeMap::new();
        for solid in &self.solids {
            by_material
                .entry(solid.material.as_str())
                .or_default()
                .push(Ok(flatten_solid(solid)));
        }
        for mesh in &self.meshes {
            by_material
                .entry(mesh.material.as_str())
                .or_default()
                .push(flatten_mesh(mesh));
        }

        let mut baked = BakedWorld {
            name: self.name.clone(),
            ..BakedWorld::default()
        };
        for (material, meshes) in by_material {
            match merge_group(material, meshes) {
                Ok((group, dropped)) => {
                    baked.dropped_degenerate += dropped;
                    baked.groups.push(group);
                }
                Err(error) => {
                    log::warn!(
                        "world '{}': skipping material group '{}': {}",
                        self.name,
                        material,
                        error
                    );
                    baked.skipped.push(SkippedGroup {
                        material: material.to_string(),
                        error,
                    });
                }
            }
        }
        log::info!(
            "baked world '{}': {} triangles in {} groups ({} skipped, {} degenerate dropped)",
            baked.name,
            baked.triangle_count(),
            baked.groups.len(),
            baked.skipped.len(),
            baked.dropped_degenerate
        );
        Ok(baked)
    }
}

fn merge_group(
    material: &str,
    meshes: Vec<Result<FlatMesh, GeometryError>>,
) -> Result<(BakedGroup, usize), GeometryError> {
    let mut attributes: Option<Vec<String>> = None;
    let mut triangles = Vec::new();
    let mut dropped = 0;
    for mesh in meshes {
        let mesh = mesh?;
        match &attributes {
            Some(expected) if *expected != mesh.attributes => {
                return Err(GeometryError::AttributeMismatch {
                    material: material.to_string(),
                    expected: expected.clone(),
                    found: mesh.attributes,
                });
            }
            Some(_) => {}
            None => attributes = Some(mesh.attributes.clone()),
        }
        for triangle in mesh.triangles {
            if triangle.area() <= AREA_EPS {
                dropped += 1;
            } else {
                triangles.push(triangle);
            }
        }
    }
    Ok((
        BakedGroup {
            material: material.to_string(),
            attributes: attributes.unwrap_or_default(),
            triangles,
        },
        dropped,
    ))
}

fn flatten_solid(solid: &SolidSpec) -> FlatMesh {
    let yaw = solid.yaw_deg.unwrap_or(0.0).to_radians();
    let pos = Point::from(solid.pos);
    let triangles = match solid.kind {
        SolidKind::Box => {
            let size = solid.size.unwrap_or([0.0; 3]);
            box_triangles(pos, Vector::from(size), yaw)
        }
        SolidKind::Ramp => ramp_triangles(
            pos,
            solid.length.unwrap_or(0.0),
            solid.width.unwrap_or(0.0),
            solid.angle_deg.unwrap_or(0.0).to_radians(),
            yaw,
        ),
    };
    FlatMesh {
        attributes: SOLID_ATTRIBUTES.iter().map(|name| name.to_string()).collect(),
        triangles,
    }
}

fn flatten_mesh(mesh: &MeshSpec) -> Result<FlatMesh, GeometryError> {
    if !mesh.attributes.iter().any(|name| name == "position") {
        return Err(GeometryError::MissingPosition {
            mesh: mesh.id.clone(),
        });
    }
    if !mesh.scale.is_finite() || mesh.scale <= 0.0 {
        return Err(GeometryError::InvalidScale {
            mesh: mesh.id.clone(),
            scale: mesh.scale,
        });
    }
    if !vector_is_finite(mesh.pos) || !mesh.positions.iter().all(|value| vector_is_finite(*value)) {
        return Err(GeometryError::NonFinite {
            mesh: mesh.id.clone(),
        });
    }
    let placement = placement(Point::from(mesh.pos), mesh.yaw_deg.unwrap_or(0.0).to_radians());
    let vertices: Vec<Point<Real>> = mesh
        .positions
        .iter()
        .map(|value| placement * Point::from(Vector::from(*value) * mesh.scale))
        .collect();

    let triangles = match &mesh.indices {
        Some(indices) => {
            if indices.len() % 3 != 0 {
                return Err(GeometryError::IndexCount {
                    mesh: mesh.id.clone(),
                    count: indices.len(),
                });
            }
            let mut triangles = Vec::with_capacity(indices.len() / 3);
            for corner in indices.chunks_exact(3) {
                let mut points = [Point::origin(); 3];
                for (slot, index) in points.iter_mut().zip(corner) {
                    *slot = *vertices.get(*index as usize).ok_or_else(|| {
                        GeometryError::IndexOutOfRange {
                            mesh: mesh.id.clone(),
                            index: *index,
                            vertex_count: vertices.len(),
                        }
                    })?;
                }
                triangles.push(Triangle::new(points[0], points[1], points[2]));
            }
            triangles
        }
        None => {
            if vertices.len() % 3 != 0 {
                return Err(GeometryError::VertexCount {
                    mesh: mesh.id.clone(),
                    count: vertices.len(),
                });
            }
            vertices
                .chunks_exact(3)
                .map(|corner| Triangle::new(corner[0], corner[1], corner[2]))
                .collect()
        }
    };

    let mut attributes = mesh.attributes.clone();
    attributes.sort();
    attributes.dedup();
    Ok(FlatMesh {
        attributes,
        triangles,
    })
}

fn placement(pos: Point<Real>, yaw: Real) -> Isometry<Real> {
    Isometry::new(pos.coords, Vector::y() * yaw)
}

/// Twelve outward-facing triangles of a box centred on `center`, rotated by `yaw` about +Y.
pub fn box_triangles(center: Point<Real>, size: Vector<Real>, yaw: Real) -> Vec<Triangle> {
    let h = size * 0.5;
    let placement = placement(center, yaw);
    let corner = |x: Real, y: Real, z: Real| placement * Point::new(x * h.x, y * h.y, z * h.z);
    let faces = [
        (
            [
                corner(-1.0, 1.0, -1.0),
                corner(1.0, 1.0, -1.0),
                corner(1.0, 1.0, 1.0),
                corner(-1.0, 1.0, 1.0),
            ],
            Vector::y(),
        ),
        (
            [
                corner(-1.0, -1.0, -1.0),
                corner(1.0, -1.0, -1.0),
                corner(1.0, -1.0, 1.0),
                corner(-1.0, -1.0, 1.0),
            ],
            -Vector::y(),
        ),
        (
            [
                corner(1.0, -1.0, -1.0),
                corner(1.0, 1.0, -1.0),
                corner(1.0, 1.0, 1.0),
                corner(1.0, -1.0, 1.0),
            ],
            Vector::x(),
        ),
        (
            [
                corner(-1.0, -1.0, -1.0),
                corner(-1.0, 1.0, -1.0),
                corner(-1.0, 1.0, 1.0),
                corner(-1.0, -1.0, 1.0),
            ],
            -Vector::x(),
        ),
        (
            [
                corner(-1.0, -1.0, 1.0),
                corner(1.0, -1.0, 1.0),
                corner(1.0, 1.0, 1.0),
                corner(-1.0, 1.0, 1.0),
            ],
            Vector::z(),
        ),
        (
            [
                corner(-1.0, -1.0, -1.0),
                corner(1.0, -1.0, -1.0),
                corner(1.0, 1.0, -1.0),
                corner(-1.0, 1.0, -1.0),
            ],
            -Vector::z(),
        ),
    ];
    let mut triangles = Vec::with_capacity(12);
    for (quad, outward) in faces {
        push_quad(&mut triangles, quad, placement * outward);
    }
    triangles
}

/// Wedge rising along local +X from its low edge at `low_edge`.
pub fn ramp_triangles(
    low_edge: Point<Real>,
    length: Real,
    width: Real,
    angle: Real,
    yaw: Real,
) -> Vec<Triangle> {
    let height = angle.tan() * length;
    let half_width = width * 0.5;
    let placement = placement(low_edge, yaw);
    let p = |x: Real, y: Real, z: Real| placement * Point::new(x, y, z);
    let low_near = p(0.0, 0.0, -half_width);
    let low_far = p(0.0, 0.0, half_width);
    let base_near = p(length, 0.0, -half_width);
    let base_far = p(length, 0.0, half_width);
    let top_near = p(length, height, -half_width);
    let top_far = p(length, height, half_width);

    let mut triangles = Vec::with_capacity(8);
    push_quad(
        &mut triangles,
        [low_near, top_near, top_far, low_far],
        placement * Vector::new(-height, length, 0.0),
    );
    push_quad(
        &mut triangles,
        [low_near, base_near, base_far, low_far],
        placement * -Vector::y(),
    );
    push_quad(
        &mut triangles,
        [base_near, top_near, top_far, base_far],
        placement * Vector::x(),
    );
    push_oriented(
        &mut triangles,
        Triangle::new(low_near, base_near, top_near),
        placement * -Vector::z(),
    );
    push_oriented(
        &mut triangles,
        Triangle::new(low_far, base_far, top_far),
        placement * Vector::z(),
    );
    triangles
}

fn push_quad(triangles: &mut Vec<Triangle>, quad: [Point<Real>; 4], outward: Vector<Real>) {
    push_oriented(triangles, Triangle::new(quad[0], quad[1], quad[2]), outward);
    push_oriented(triangles, Triangle::new(quad[0], quad[2], quad[3]), outward);
}

fn push_oriented(triangles: &mut Vec<Triangle>, triangle: Triangle, outward: Vector<Real>) {
    if triangle.scaled_normal().dot(&outward) < 0.0 {
        triangles.push(Triangle::new(triangle.a, triangle.c, triangle.b));
    } else {
        triangles.push(triangle);
    }
}

fn validate_solid(solid: &SolidSpec, validation: &mut GeometryValidation) {
    if solid.id.trim().is_empty() {
        validation
            .errors
            .push("solid id must not be empty".to_string());
    }
    if solid.material.trim().is_empty() {
        validation
            .errors
            .push(format!("solid '{}' material must not be empty", solid.id));
    }
    if !vector_is_finite(solid.pos) {
        validation
            .errors
            .push(format!("solid '{}' has invalid pos", solid.id));
    }
    if let Some(yaw) = solid.yaw_deg {
        if !yaw.is_finite() {
            validation
                .errors
                .push(format!("solid '{}' has invalid yaw_deg", solid.id));
        }
    }
    match solid.kind {
        SolidKind::Box => match solid.size {
            Some(size) if vector_is_finite(size) && size.iter().all(|value| *value > 0.0) => {}
            Some(_) => validation
                .errors
                .push(format!("solid '{}' has invalid size", solid.id)),
            None => validation
                .errors
                .push(format!("solid '{}' missing size", solid.id)),
        },
        SolidKind::Ramp => {
            let (Some(length), Some(width), Some(angle)) =
                (solid.length, solid.width, solid.angle_deg)
            else {
                validation.errors.push(format!(
                    "solid '{}' ramp requires length, width and angle_deg",
                    solid.id
                ));
                return;
            };
            if !(length.is_finite() && length > 0.0 && width.is_finite() && width > 0.0) {
                validation
                    .errors
                    .push(format!("solid '{}' ramp has invalid extent", solid.id));
            }
            if !(angle > 0.0 && angle < MAX_RAMP_ANGLE_DEG) {
                validation.errors.push(format!(
                    "solid '{}' ramp angle_deg must be between 0 and {}",
                    solid.id, MAX_RAMP_ANGLE_DEG
                ));
            }
        }
    }
}

fn validate_mesh(mesh: &MeshSpec, validation: &mut GeometryValidation) {
    if mesh.id.trim().is_empty() {
        validation
            .errors
            .push("mesh id must not be empty".to_string());
    }
    if mesh.material.trim().is_empty() {
        validation
            .errors
            .push(format!("mesh '{}' material must not be empty", mesh.id));
    }
    if mesh.positions.is_empty() {
        validation
            .warnings
            .push(format!("mesh '{}' has no positions", mesh.id));
    }
}

fn vector_is_finite(value: [f32; 3]) -> bool {
    value.iter().all(|component| component.is_finite())
}

fn default_material() -> String {
    "default".to_string()
}

fn default_scale() -> f32 {
    1.0
}

fn default_attributes() -> Vec<String> {
    vec!["position".to_string()]
}
