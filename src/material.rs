//! Surface materials and the contact-material pair table
//!
//! The table is owned by the world instance; there is no process-wide
//! registry. Pairs are keyed by canonicalized (min id, max id) so one
//! registration covers both operand orders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::consts::{CONTACT_RELAXATION, CONTACT_STIFFNESS, DEFAULT_FRICTION, DEFAULT_RESTITUTION};

/// Handle to a material registered with a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Per-surface properties; `None` defers to the contact-material or world default
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Material {
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl Material {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction: Some(friction),
            restitution: Some(restitution),
        }
    }
}

/// Effective parameters for one pair of materials
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub contact_stiffness: f32,
    pub contact_relaxation: f32,
    pub friction_stiffness: f32,
    pub friction_relaxation: f32,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction: DEFAULT_FRICTION,
            restitution: DEFAULT_RESTITUTION,
            contact_stiffness: CONTACT_STIFFNESS,
            contact_relaxation: CONTACT_RELAXATION,
            friction_stiffness: CONTACT_STIFFNESS,
            friction_relaxation: CONTACT_RELAXATION,
        }
    }
}

impl ContactMaterial {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Default::default()
        }
    }
}

/// World-owned material registry with a default fallback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialTable {
    materials: Vec<Material>,
    pairs: HashMap<(u32, u32), ContactMaterial>,
    pub default: ContactMaterial,
}

impl MaterialTable {
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        id
    }

    pub fn add_contact_material(&mut self, a: MaterialId, b: MaterialId, cm: ContactMaterial) {
        self.pairs.insert(pair_key(a, b), cm);
    }

    /// Resolve the effective contact material for two (optional) materials.
    ///
    /// A registered pair wins; otherwise per-material friction/restitution
    /// are combined (product / max, the usual game-engine mix) over the
    /// world default's stiffness settings.
    pub fn lookup(&self, a: Option<MaterialId>, b: Option<MaterialId>) -> ContactMaterial {
        if let (Some(a), Some(b)) = (a, b)
            && let Some(cm) = self.pairs.get(&pair_key(a, b))
        {
            return *cm;
        }
        let ma = a.and_then(|id| self.materials.get(id.0 as usize)).copied();
        let mb = b.and_then(|id| self.materials.get(id.0 as usize)).copied();
        let mut cm = self.default;
        match (
            ma.and_then(|m| m.friction),
            mb.and_then(|m| m.friction),
        ) {
            (Some(fa), Some(fb)) => cm.friction = fa * fb,
            (Some(f), None) | (None, Some(f)) => cm.friction = f,
            (None, None) => {}
        }
        match (
            ma.and_then(|m| m.restitution),
            mb.and_then(|m| m.restitution),
        ) {
            (Some(ra), Some(rb)) => cm.restitution = ra.max(rb),
            (Some(r), None) | (None, Some(r)) => cm.restitution = r,
            (None, None) => {}
        }
        cm
    }
}

fn pair_key(a: MaterialId, b: MaterialId) -> (u32, u32) {
    (a.0.min(b.0), a.0.max(b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_lookup_is_symmetric() {
        let mut table = MaterialTable::default();
        let ice = table.add_material(Material::new(0.02, 0.1));
        let rubber = table.add_material(Material::new(0.9, 0.8));
        table.add_contact_material(ice, rubber, ContactMaterial::new(0.05, 0.5));

        let ab = table.lookup(Some(ice), Some(rubber));
        let ba = table.lookup(Some(rubber), Some(ice));
        assert_eq!(ab.friction, 0.05);
        assert_eq!(ba.friction, 0.05);
        assert_eq!(ab.restitution, 0.5);
    }

    #[test]
    fn test_fallback_combines_materials() {
        let mut table = MaterialTable::default();
        let a = table.add_material(Material::new(0.5, 0.2));
        let b = table.add_material(Material::new(0.4, 0.9));
        let cm = table.lookup(Some(a), Some(b));
        assert!((cm.friction - 0.2).abs() < 1e-6);
        assert!((cm.restitution - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_default_fallback() {
        let table = MaterialTable::default();
        let cm = table.lookup(None, None);
        assert_eq!(cm.friction, DEFAULT_FRICTION);
        assert_eq!(cm.restitution, DEFAULT_RESTITUTION);
    }
}
