//! Convex collision shapes
//!
//! Shapes are stored in body-local space and only see world space through a
//! [`ShapeView`], which pairs the geometry with a pose for the duration of a
//! query. Every variant exposes a support function, which is all the
//! narrow-phase needs.

use crate::foundation::collections::ShapeId;
use crate::foundation::math::{utils, Mat3, Pose, Vec3};
use crate::spatial::Aabb;
use super::collision_groups::CollisionGroups;
use super::error::{PhysicsError, PhysicsResult};

/// Anything with a convex support function
pub trait SupportMap {
    /// Point of the shape furthest along `direction` (world space)
    fn support(&self, direction: &Vec3) -> Vec3;
}

/// Point cloud whose convex hull is the shape
#[derive(Debug, Clone)]
pub struct ConvexHull {
    points: Vec<Vec3>,
    centroid: Vec3,
    local_aabb: Aabb,
}

impl ConvexHull {
    /// Build a hull from body-local points
    pub fn new(points: Vec<Vec3>) -> PhysicsResult<Self> {
        let local_aabb = Aabb::from_points(&points).ok_or(PhysicsError::EmptyConvexHull)?;
        let centroid = points.iter().sum::<Vec3>() / points.len() as f32;
        Ok(Self {
            points,
            centroid,
            local_aabb,
        })
    }

    /// Axis-aligned box hull with the given half extents, centered on the origin
    pub fn cuboid(half_extents: Vec3) -> Self {
        let aabb = Aabb::from_center_extents(Vec3::zeros(), half_extents);
        let points = aabb.corners().to_vec();
        Self {
            points,
            centroid: Vec3::zeros(),
            local_aabb: aabb,
        }
    }

    /// Hull vertices in body-local space
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Average of the hull vertices
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Bounding box in body-local space
    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    /// Brute-force max dot product scan
    fn local_support(&self, direction: &Vec3) -> Vec3 {
        let mut best = self.points[0];
        let mut best_dot = best.dot(direction);
        for point in &self.points[1..] {
            let dot = point.dot(direction);
            if dot > best_dot {
                best_dot = dot;
                best = *point;
            }
        }
        best
    }
}

/// Geometry of a convex shape
#[derive(Debug, Clone)]
pub enum ShapeKind {
    /// Sphere centered on the body origin
    Ball {
        /// Sphere radius
        radius: f32,
    },

    /// Convex hull of body-local points
    ConvexHull(ConvexHull),

    /// Union of two posed shapes; support picks whichever part reaches further
    Combined(Box<[PosedShape; 2]>),

    /// Zero-extent point at the body origin
    Singleton,
}

impl ShapeKind {
    /// World-space bounding box at the given pose, grown by `margin`
    pub fn aabb(&self, pose: &Pose, margin: f32) -> Aabb {
        let aabb = match self {
            Self::Ball { radius } => {
                Aabb::from_center_extents(pose.position, Vec3::repeat(*radius))
            }
            Self::ConvexHull(hull) => {
                let mut aabb = Aabb::from_point(pose.transform_point(&hull.points[0]));
                for point in &hull.points[1..] {
                    aabb = aabb.including(&pose.transform_point(point));
                }
                aabb
            }
            Self::Combined(parts) => {
                let [a, b] = parts.as_ref();
                a.kind.aabb(&pose.compose(&a.pose), a.margin)
                    .union(&b.kind.aabb(&pose.compose(&b.pose), b.margin))
            }
            Self::Singleton => Aabb::from_point(pose.position),
        };
        aabb.expanded(margin)
    }
}

/// Shape geometry placed at a pose relative to its parent frame
#[derive(Debug, Clone)]
pub struct PosedShape {
    /// Geometry
    pub kind: ShapeKind,
    /// Placement
    pub pose: Pose,
    /// Extra radius around the geometry
    pub margin: f32,
}

impl PosedShape {
    /// Place geometry at a pose with no margin
    pub fn new(kind: ShapeKind, pose: Pose) -> Self {
        Self { kind, pose, margin: 0.0 }
    }

    /// Set the margin
    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// View this shape in world space
    pub fn view(&self) -> ShapeView<'_> {
        ShapeView::new(&self.kind, self.pose, self.margin)
    }
}

/// Shape geometry borrowed together with a world pose
#[derive(Debug, Clone, Copy)]
pub struct ShapeView<'a> {
    /// Geometry
    pub kind: &'a ShapeKind,
    /// World pose of the shape's frame
    pub pose: Pose,
    /// Extra radius around the geometry
    pub margin: f32,
}

impl<'a> ShapeView<'a> {
    /// Create a new view
    pub fn new(kind: &'a ShapeKind, pose: Pose, margin: f32) -> Self {
        Self { kind, pose, margin }
    }

    /// World-space bounding box
    pub fn aabb(&self) -> Aabb {
        self.kind.aabb(&self.pose, self.margin)
    }

    /// Ball center and total radius if this is a ball
    pub fn as_ball(&self) -> Option<(Vec3, f32)> {
        match self.kind {
            ShapeKind::Ball { radius } => Some((self.pose.position, radius + self.margin)),
            _ => None,
        }
    }

    fn core_support(&self, direction: &Vec3) -> Vec3 {
        match self.kind {
            ShapeKind::Ball { radius } => match utils::try_normalize(direction) {
                Some(dir) => self.pose.position + dir * *radius,
                None => self.pose.position,
            },
            ShapeKind::ConvexHull(hull) => {
                let local_dir = self.pose.inverse_transform_vector(direction);
                self.pose.transform_point(&hull.local_support(&local_dir))
            }
            ShapeKind::Combined(parts) => {
                let [a, b] = parts.as_ref();
                let pa = ShapeView::new(&a.kind, self.pose.compose(&a.pose), a.margin).support(direction);
                let pb = ShapeView::new(&b.kind, self.pose.compose(&b.pose), b.margin).support(direction);
                if pa.dot(direction) >= pb.dot(direction) { pa } else { pb }
            }
            ShapeKind::Singleton => self.pose.position,
        }
    }
}

impl SupportMap for ShapeView<'_> {
    fn support(&self, direction: &Vec3) -> Vec3 {
        let point = self.core_support(direction);
        if self.margin > 0.0 {
            if let Some(dir) = utils::try_normalize(direction) {
                return point + dir * self.margin;
            }
        }
        point
    }
}

/// Friction and restitution applied when the contact normal points along `direction`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialOverride {
    /// Body-local outward direction (normalized on construction)
    pub direction: Vec3,
    /// Friction coefficient
    pub friction: f32,
    /// Restitution coefficient
    pub restitution: f32,
}

impl MaterialOverride {
    /// Create a new override; a zero direction never matches
    pub fn new(direction: Vec3, friction: f32, restitution: f32) -> Self {
        Self {
            direction: utils::try_normalize(&direction).unwrap_or_else(Vec3::zeros),
            friction,
            restitution,
        }
    }
}

/// Convex collision shape owned by a rigid body
///
/// The shape records the id it was given when attached; attaching it (or a
/// clone of it) to a second body is rejected.
#[derive(Debug, Clone)]
pub struct CollisionShape {
    id: Option<ShapeId>,
    kind: ShapeKind,
    margin: f32,

    /// Groups this shape is tested against
    pub detection_mask: CollisionGroups,

    /// Groups this shape exchanges impulses with
    pub response_mask: CollisionGroups,

    /// Friction coefficient
    pub friction: f32,

    /// Restitution coefficient
    pub restitution: f32,

    /// Directional material overrides
    pub material_overrides: Vec<MaterialOverride>,

    mass: f32,
    inertia: Mat3,
    inverse_inertia: Mat3,
    aabb: Aabb,
    broadphase_shape: Option<ShapeKind>,

    /// Opaque value for mapping back to a game object
    pub user_data: u64,
}

impl CollisionShape {
    fn from_kind(kind: ShapeKind, mass: f32) -> Self {
        let mut shape = Self {
            id: None,
            kind,
            margin: 0.0,
            detection_mask: CollisionGroups::default(),
            response_mask: CollisionGroups::default(),
            friction: 0.5,
            restitution: 0.5,
            material_overrides: Vec::new(),
            mass,
            inertia: Mat3::zeros(),
            inverse_inertia: Mat3::zeros(),
            aabb: Aabb::from_point(Vec3::zeros()),
            broadphase_shape: None,
            user_data: 0,
        };
        shape.compute_mass_properties();
        shape.aabb = shape.kind.aabb(&Pose::identity(), shape.margin);
        shape
    }

    /// Solid ball of unit mass
    pub fn ball(radius: f32) -> Self {
        Self::from_kind(ShapeKind::Ball { radius }, 1.0)
    }

    /// Convex hull of unit mass
    pub fn convex_hull(points: Vec<Vec3>) -> PhysicsResult<Self> {
        Ok(Self::from_kind(ShapeKind::ConvexHull(ConvexHull::new(points)?), 1.0))
    }

    /// Box hull of unit mass
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::from_kind(ShapeKind::ConvexHull(ConvexHull::cuboid(half_extents)), 1.0)
    }

    /// Massless point at the body origin
    pub fn singleton() -> Self {
        Self::from_kind(ShapeKind::Singleton, 0.0)
    }

    /// Massless union of two posed shapes
    pub fn combined(first: PosedShape, second: PosedShape) -> Self {
        Self::from_kind(ShapeKind::Combined(Box::new([first, second])), 0.0)
    }

    /// Set the mass, rescaling the inertia tensor
    pub fn with_mass(mut self, mass: f32) -> PhysicsResult<Self> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(PhysicsError::InvalidMass(mass));
        }
        self.mass = mass;
        self.compute_mass_properties();
        Ok(self)
    }

    /// Set the friction coefficient
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution coefficient
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the detection and response masks
    pub fn with_masks(mut self, detection: CollisionGroups, response: CollisionGroups) -> Self {
        self.detection_mask = detection;
        self.response_mask = response;
        self
    }

    /// Set the margin
    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    /// Add a directional material override
    pub fn with_material_override(mut self, material: MaterialOverride) -> Self {
        self.material_overrides.push(material);
        self
    }

    /// Use simpler geometry for the time-of-impact search
    pub fn with_broadphase_shape(mut self, kind: ShapeKind) -> Self {
        self.broadphase_shape = Some(kind);
        self
    }

    /// Set the user data
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Id within the owning body, `None` while detached
    pub fn id(&self) -> Option<ShapeId> {
        self.id
    }

    pub(crate) fn attach(&mut self, id: ShapeId) -> PhysicsResult<()> {
        if self.id.is_some() {
            return Err(PhysicsError::ShapeAlreadyAttached);
        }
        self.id = Some(id);
        Ok(())
    }

    pub(crate) fn detach(&mut self) {
        self.id = None;
    }

    /// Geometry
    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Extra radius around the geometry
    pub fn margin(&self) -> f32 {
        self.margin
    }

    /// Mass
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Body-local inertia tensor about the body origin
    pub fn inertia(&self) -> Mat3 {
        self.inertia
    }

    /// Inverse of [`Self::inertia`], zero when singular
    pub fn inverse_inertia(&self) -> Mat3 {
        self.inverse_inertia
    }

    /// Cached world-space bounding box
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Geometry substituted during the time-of-impact search
    pub fn broadphase_shape(&self) -> Option<&ShapeKind> {
        self.broadphase_shape.as_ref()
    }

    /// View the shape at a world pose
    pub fn view(&self, pose: &Pose) -> ShapeView<'_> {
        ShapeView::new(&self.kind, *pose, self.margin)
    }

    /// View the time-of-impact geometry at a world pose
    pub fn broadphase_view(&self, pose: &Pose) -> ShapeView<'_> {
        let kind = self.broadphase_shape.as_ref().unwrap_or(&self.kind);
        ShapeView::new(kind, *pose, self.margin)
    }

    /// Recompute the cached bounding box at a new pose
    pub(crate) fn update_aabb(&mut self, pose: &Pose) {
        self.aabb = self.kind.aabb(pose, self.margin);
    }

    /// Friction and restitution for a contact whose outward normal (body-local)
    /// is `local_normal`
    ///
    /// The override best aligned with the normal wins when its cosine reaches
    /// `min_cosine`; otherwise the shape's own coefficients apply.
    pub fn resolve_material(&self, local_normal: &Vec3, min_cosine: f32) -> (f32, f32) {
        let best = self
            .material_overrides
            .iter()
            .map(|m| (m, m.direction.dot(local_normal)))
            .filter(|(_, cosine)| *cosine >= min_cosine)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((material, _)) => (material.friction, material.restitution),
            None => (self.friction, self.restitution),
        }
    }

    fn compute_mass_properties(&mut self) {
        let m = self.mass;
        self.inertia = match &self.kind {
            ShapeKind::Ball { radius } => Mat3::from_diagonal_element(0.4 * m * radius * radius),
            ShapeKind::ConvexHull(hull) => {
                // Solid box over the local bounds, shifted to the body origin
                let size = hull.local_aabb.size();
                let (x2, y2, z2) = (size.x * size.x, size.y * size.y, size.z * size.z);
                let about_center = Mat3::from_diagonal(&Vec3::new(y2 + z2, x2 + z2, x2 + y2)) * (m / 12.0);
                let c = hull.local_aabb.center();
                about_center + (Mat3::from_diagonal_element(c.norm_squared()) - c * c.transpose()) * m
            }
            ShapeKind::Combined(_) | ShapeKind::Singleton => Mat3::zeros(),
        };
        self.inverse_inertia = self.inertia.try_inverse().unwrap_or_else(Mat3::zeros);
    }
}
