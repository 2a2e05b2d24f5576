//! Light sources and the per-scene lighting environment

use crate::foundation::math::Vec3;

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Directional light (like sunlight)
    Directional,
    /// Point light with finite radius of influence
    Point,
}

/// Light source
#[derive(Debug, Clone)]
pub struct Light {
    /// Light type
    pub light_type: LightType,
    /// Position in world space (point lights)
    pub position: Vec3,
    /// Direction in world space (directional lights)
    pub direction: Vec3,
    /// Linear-space RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Radius of influence (point lights)
    pub radius: f32,
}

impl Light {
    /// Create a directional light
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        let direction = if direction.norm() > f32::EPSILON {
            direction.normalize()
        } else {
            Vec3::new(0.0, -1.0, 0.0)
        };
        Self {
            light_type: LightType::Directional,
            position: Vec3::zeros(),
            direction,
            color,
            intensity,
            radius: 0.0,
        }
    }

    /// Create a point light
    pub fn point(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            direction: Vec3::zeros(),
            color,
            intensity,
            radius,
        }
    }
}

/// All lights affecting a scene, plus the ambient term
#[derive(Debug, Clone)]
pub struct LightingEnvironment {
    /// Lights in the scene
    pub lights: Vec<Light>,
    /// Ambient light color
    pub ambient_color: Vec3,
    /// Ambient light intensity
    pub ambient_intensity: f32,
}

impl LightingEnvironment {
    /// Create an empty environment with a dim white ambient term
    pub fn new() -> Self {
        Self {
            lights: Vec::new(),
            ambient_color: Vec3::new(1.0, 1.0, 1.0),
            ambient_intensity: 0.1,
        }
    }

    /// Add a light (builder style)
    pub fn add_light(mut self, light: Light) -> Self {
        self.lights.push(light);
        self
    }

    /// Set the ambient term (builder style)
    pub fn with_ambient(mut self, color: Vec3, intensity: f32) -> Self {
        self.ambient_color = color;
        self.ambient_intensity = intensity;
        self
    }

    /// Iterate over directional lights only
    pub fn directional_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights
            .iter()
            .filter(|l| l.light_type == LightType::Directional)
    }

    /// Iterate over point lights only
    pub fn point_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|l| l.light_type == LightType::Point)
    }

    /// Index of the strongest directional light in `lights`. The index
    /// pins one light as the shadow caster even when intensities tie.
    pub fn dominant_directional_index(&self) -> Option<usize> {
        self.lights
            .iter()
            .enumerate()
            .filter(|(_, l)| l.light_type == LightType::Directional)
            .max_by(|(_, a), (_, b)| a.intensity.total_cmp(&b.intensity))
            .map(|(index, _)| index)
    }

    /// The strongest directional light; its direction drives the shadow
    /// cascades
    pub fn dominant_directional(&self) -> Option<&Light> {
        self.dominant_directional_index().map(|i| &self.lights[i])
    }
}

impl Default for LightingEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_directional_picks_strongest() {
        let env = LightingEnvironment::new()
            .add_light(Light::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 0.5))
            .add_light(Light::directional(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 2.0))
            .add_light(Light::point(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 10.0, 5.0));

        let dominant = env.dominant_directional().expect("has directional light");
        assert_eq!(dominant.intensity, 2.0);
    }

    #[test]
    fn test_dominant_index_agrees_with_dominant_light() {
        let env = LightingEnvironment::new()
            .add_light(Light::point(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 9.0, 5.0))
            .add_light(Light::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 2.0))
            .add_light(Light::directional(Vec3::new(1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 2.0));

        let index = env.dominant_directional_index().expect("has directional light");
        let dominant = env.dominant_directional().expect("has directional light");
        assert_eq!(env.lights[index].direction, dominant.direction);
        assert_eq!(env.lights[index].light_type, LightType::Directional);
    }

    #[test]
    fn test_degenerate_direction_falls_back_to_down() {
        let light = Light::directional(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0), 1.0);
        assert_eq!(light.direction, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_light_type_filters() {
        let env = LightingEnvironment::new()
            .add_light(Light::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0), 1.0))
            .add_light(Light::point(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 1.0, 5.0))
            .add_light(Light::point(Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0), 1.0, 3.0));

        assert_eq!(env.directional_lights().count(), 1);
        assert_eq!(env.point_lights().count(), 2);
    }
}
