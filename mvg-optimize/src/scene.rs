use mvg_core::{
    nalgebra::Point2, GeometryError, Pose, Projective, ProjectiveCamera, WorldPoint,
    WorldToCamera,
};

/// A single image observation of a scene point from one view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub view: usize,
    pub point: usize,
    pub image: Point2<f64>,
}

/// A reconstruction being optimized: views, points, and the observation
/// graph connecting them.
///
/// Indices into the view and point lists are stable until a removal;
/// removals drop every observation of the removed element and shift the
/// indices above it down, so the graph never holds a dangling index.
#[derive(Debug, Clone, Default)]
pub struct SceneStructure<C> {
    views: Vec<C>,
    points: Vec<WorldPoint>,
    observations: Vec<Observation>,
}

/// Metric scene: calibrated views with a rotation/translation split.
pub type SceneStructureMetric = SceneStructure<WorldToCamera>;

/// Projective scene: views are general `3x4` cameras and points are
/// homogeneous, both defined up to scale.
pub type SceneStructureProjective = SceneStructure<ProjectiveCamera>;

impl<C> SceneStructure<C> {
    pub fn new() -> Self {
        Self {
            views: Vec::new(),
            points: Vec::new(),
            observations: Vec::new(),
        }
    }

    pub fn add_view(&mut self, view: C) -> usize {
        self.views.push(view);
        self.views.len() - 1
    }

    pub fn add_point(&mut self, point: WorldPoint) -> usize {
        self.points.push(point);
        self.points.len() - 1
    }

    /// Connect a view and a point with an image observation.
    ///
    /// Fails when either index does not name an existing element, keeping
    /// the graph free of dangling references.
    pub fn add_observation(
        &mut self,
        view: usize,
        point: usize,
        image: Point2<f64>,
    ) -> Result<(), GeometryError> {
        if view >= self.views.len() || point >= self.points.len() {
            return Err(GeometryError::DegenerateInput(
                "observation references a view or point that does not exist",
            ));
        }
        self.observations.push(Observation { view, point, image });
        Ok(())
    }

    /// Remove a view along with all of its observations. Observations of
    /// later views have their view index shifted down.
    pub fn remove_view(&mut self, view: usize) {
        if view >= self.views.len() {
            return;
        }
        self.views.remove(view);
        self.observations.retain(|o| o.view != view);
        for observation in &mut self.observations {
            if observation.view > view {
                observation.view -= 1;
            }
        }
    }

    /// Remove a point along with all of its observations. Observations of
    /// later points have their point index shifted down.
    pub fn remove_point(&mut self, point: usize) {
        if point >= self.points.len() {
            return;
        }
        self.points.remove(point);
        self.observations.retain(|o| o.point != point);
        for observation in &mut self.observations {
            if observation.point > point {
                observation.point -= 1;
            }
        }
    }

    pub fn views(&self) -> &[C] {
        &self.views
    }

    pub fn points(&self) -> &[WorldPoint] {
        &self.points
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub(crate) fn commit(&mut self, views: Vec<C>, points: Vec<WorldPoint>) {
        self.views = views;
        self.points = points;
    }
}

impl SceneStructureMetric {
    /// Total squared reprojection error over all observations, in
    /// normalized image coordinates. Observations that do not project are
    /// counted as infinite.
    pub fn total_reprojection_error(&self) -> f64 {
        self.observations
            .iter()
            .map(|o| {
                self.views[o.view]
                    .transform(self.points[o.point])
                    .image_point()
                    .map(|projected| (projected - o.image).norm_squared())
                    .unwrap_or(f64::INFINITY)
            })
            .sum()
    }
}

impl SceneStructureProjective {
    /// Total squared reprojection error over all observations.
    pub fn total_reprojection_error(&self) -> f64 {
        self.observations
            .iter()
            .map(|o| {
                self.views[o.view]
                    .project(self.points[o.point])
                    .map(|projected| (projected - o.image).norm_squared())
                    .unwrap_or(f64::INFINITY)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::nalgebra::{Point3, Rotation3, Vector3};

    fn sample_scene() -> SceneStructureMetric {
        let mut scene = SceneStructureMetric::new();
        let a = scene.add_view(WorldToCamera::identity());
        let b = scene.add_view(WorldToCamera::from_parts(
            Vector3::new(-0.3, 0.0, 0.0),
            Rotation3::identity(),
        ));
        let p0 = scene.add_point(WorldPoint::from_point(Point3::new(0.1, 0.1, 2.0)));
        let p1 = scene.add_point(WorldPoint::from_point(Point3::new(-0.2, 0.3, 1.5)));
        for (view, point) in [(a, p0), (a, p1), (b, p0), (b, p1)] {
            let image = scene.views()[view]
                .transform(scene.points()[point])
                .image_point()
                .unwrap();
            scene.add_observation(view, point, image).unwrap();
        }
        scene
    }

    #[test]
    fn removing_a_point_drops_its_observations_and_remaps_the_rest() {
        let mut scene = sample_scene();
        scene.remove_point(0);
        assert_eq!(scene.points().len(), 1);
        assert_eq!(scene.observations().len(), 2);
        assert!(scene.observations().iter().all(|o| o.point == 0));
    }

    #[test]
    fn removing_a_view_drops_its_observations_and_remaps_the_rest() {
        let mut scene = sample_scene();
        scene.remove_view(0);
        assert_eq!(scene.views().len(), 1);
        assert_eq!(scene.observations().len(), 2);
        assert!(scene.observations().iter().all(|o| o.view == 0));
    }

    #[test]
    fn dangling_observation_is_rejected() {
        let mut scene = sample_scene();
        assert!(scene.add_observation(5, 0, Point2::new(0.0, 0.0)).is_err());
    }

    #[test]
    fn consistent_scene_has_zero_error() {
        assert!(sample_scene().total_reprojection_error() < 1e-20);
    }
}
