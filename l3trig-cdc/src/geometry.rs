//! Drift-chamber geometry arena.
//!
//! [`DriftChamber`] owns every wire of the detector in one table, addressed by
//! [`WireId`]. The table ends with a sentinel wire that stands in for
//! neighbors outside a superlayer; it is dead, so it is never hit and never
//! enters a cluster. Per-event state lives on the wires and is cleared in one
//! pass by [`DriftChamber::reset`].
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use crate::layer::{Layer, SuperLayer};
use crate::wire::{Neighbor, Wire, WireId};
use l3trig_core::{CellKind, ChamberConfig, Error, Result};
use std::f64::consts::TAU;

/// Static wire geometry plus per-wire event state.
#[derive(Debug, Clone)]
pub struct DriftChamber {
    wires: Vec<Wire>,
    layers: Vec<Layer>,
    superlayers: Vec<SuperLayer>,
    axial: Vec<usize>,
    stereo: Vec<usize>,
}

impl DriftChamber {
    /// Builds the wire table and the neighbor relations.
    ///
    /// Consecutive layers with equal wire count and stereo shift form one
    /// superlayer.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a dead wire does
    /// not exist.
    pub fn new(config: &ChamberConfig) -> Result<Self> {
        config.validate()?;

        let mut layers: Vec<Layer> = Vec::with_capacity(config.layers.len());
        let mut superlayers: Vec<SuperLayer> = Vec::new();
        let mut first_wire = 0u32;

        for (id, cfg) in config.layers.iter().enumerate() {
            let starts_superlayer = superlayers
                .last()
                .is_none_or(|sl| sl.shift != cfg.shift || sl.n_wires != cfg.n_wires);
            if starts_superlayer {
                superlayers.push(SuperLayer {
                    id: superlayers.len(),
                    first_layer: id,
                    n_layers: 0,
                    shift: cfg.shift,
                    n_wires: cfg.n_wires,
                });
            }
            let Some(superlayer) = superlayers.last_mut() else {
                return Err(Error::Geometry("layer without superlayer".into()));
            };
            let row = superlayer.n_layers;
            superlayer.n_layers += 1;

            let layer_id = u16::try_from(id)
                .map_err(|_| Error::Geometry(format!("too many layers ({id})")))?;
            layers.push(Layer {
                id: layer_id,
                superlayer: superlayer.id,
                row,
                radius: cfg.radius,
                n_wires: cfg.n_wires,
                first_wire,
                offset: cfg.offset,
                shift: cfg.shift,
                forward_z: cfg.forward_z,
                backward_z: cfg.backward_z,
                cell_size: TAU * cfg.radius / f64::from(cfg.n_wires),
            });
            first_wire += u32::from(cfg.n_wires);
        }

        let sentinel = WireId(first_wire);
        let mut wires = Vec::with_capacity(first_wire as usize + 1);
        for layer in &layers {
            build_layer_wires(layer, &mut wires);
        }
        wires.push(Wire::sentinel(sentinel));

        let mut chamber = Self {
            axial: superlayers
                .iter()
                .filter(|sl| sl.is_axial())
                .map(SuperLayer::id)
                .collect(),
            stereo: superlayers
                .iter()
                .filter(|sl| !sl.is_axial())
                .map(SuperLayer::id)
                .collect(),
            wires,
            layers,
            superlayers,
        };
        chamber.link_neighbors();

        for &(layer, wire) in &config.dead_wires {
            let id = chamber.wire_id(layer, wire)?;
            chamber.wires[id.index()]
                .state
                .insert(crate::wire::WireState::DEAD);
        }

        log::debug!(
            "drift chamber: {} layers, {} superlayers ({} axial), {} wires, {} dead",
            chamber.layers.len(),
            chamber.superlayers.len(),
            chamber.axial.len(),
            chamber.n_wires(),
            config.dead_wires.len()
        );
        Ok(chamber)
    }

    fn link_neighbors(&mut self) {
        let sentinel = self.sentinel();
        for layer_index in 0..self.layers.len() {
            let layer = &self.layers[layer_index];
            let superlayer = &self.superlayers[layer.superlayer];
            let inner = (layer.row > 0).then(|| &self.layers[layer_index - 1]);
            let outer =
                (layer.row + 1 < superlayer.n_layers).then(|| &self.layers[layer_index + 1]);

            for local in 0..i64::from(layer.n_wires) {
                let mut neighbors = [sentinel; 6];
                if let Some(inner) = inner {
                    let (left, right) = adjacent_row(layer, inner, local);
                    neighbors[Neighbor::InnerLeft.slot()] = left;
                    neighbors[Neighbor::InnerRight.slot()] = right;
                }
                neighbors[Neighbor::Left.slot()] = layer.wire(local - 1);
                neighbors[Neighbor::Right.slot()] = layer.wire(local + 1);
                if let Some(outer) = outer {
                    let (left, right) = adjacent_row(layer, outer, local);
                    neighbors[Neighbor::OuterLeft.slot()] = left;
                    neighbors[Neighbor::OuterRight.slot()] = right;
                }
                let id = layer.wire(local);
                self.wires[id.index()].neighbors = neighbors;
            }
        }
    }

    /// Layers, innermost first.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer with global id `id`.
    ///
    /// # Errors
    /// Returns [`Error::CellOutOfRange`] if `id` does not exist.
    pub fn layer(&self, id: u16) -> Result<&Layer> {
        self.layers.get(usize::from(id)).ok_or(Error::CellOutOfRange {
            kind: CellKind::Layer,
            id: usize::from(id),
            size: self.layers.len(),
        })
    }

    /// Superlayers, innermost first.
    #[must_use]
    pub fn superlayers(&self) -> &[SuperLayer] {
        &self.superlayers
    }

    /// Indices of the axial superlayers, innermost first.
    #[must_use]
    pub fn axial_superlayers(&self) -> &[usize] {
        &self.axial
    }

    /// Indices of the stereo superlayers, innermost first.
    #[must_use]
    pub fn stereo_superlayers(&self) -> &[usize] {
        &self.stereo
    }

    /// Number of real wires (the sentinel excluded).
    #[must_use]
    pub fn n_wires(&self) -> usize {
        self.wires.len() - 1
    }

    /// Handle of the boundary sentinel.
    #[must_use]
    pub fn sentinel(&self) -> WireId {
        WireId((self.wires.len() - 1) as u32)
    }

    /// Bounds-checked lookup of `(layer, local wire)`.
    ///
    /// # Errors
    /// Returns [`Error::CellOutOfRange`] for an unknown layer or wire.
    pub fn wire_id(&self, layer: u16, local: u16) -> Result<WireId> {
        let layer = self.layer(layer)?;
        if local >= layer.n_wires {
            return Err(Error::CellOutOfRange {
                kind: CellKind::Wire,
                id: usize::from(local),
                size: usize::from(layer.n_wires),
            });
        }
        Ok(WireId(layer.first_wire + u32::from(local)))
    }

    /// Wire behind a handle obtained from this chamber.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this chamber.
    #[inline]
    #[must_use]
    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.index()]
    }

    #[inline]
    pub(crate) fn wire_mut(&mut self, id: WireId) -> &mut Wire {
        &mut self.wires[id.index()]
    }

    /// Layer of a wire.
    #[inline]
    #[must_use]
    pub fn layer_of(&self, id: WireId) -> &Layer {
        &self.layers[usize::from(self.wires[id.index()].layer)]
    }

    /// Superlayer index of a wire.
    #[inline]
    #[must_use]
    pub fn superlayer_of(&self, id: WireId) -> usize {
        self.layer_of(id).superlayer
    }

    /// Clears the per-event state of every wire.
    pub fn reset(&mut self) {
        for wire in &mut self.wires {
            wire.reset();
        }
    }
}

fn build_layer_wires(layer: &Layer, wires: &mut Vec<Wire>) {
    let pitch = layer.pitch();
    let stereo_angle = f64::from(layer.shift) * 0.5 * pitch;
    let end_radius = layer.radius / (0.5 * stereo_angle).cos();
    let z_fraction = -layer.backward_z / (layer.forward_z - layer.backward_z);

    for local in 0..layer.n_wires {
        let phi = pitch * (f64::from(local) + layer.offset);
        let phi_b = phi - 0.5 * stereo_angle;
        let phi_f = phi + 0.5 * stereo_angle;
        wires.push(Wire::new(
            WireId(layer.first_wire + u32::from(local)),
            layer.id,
            local,
            [end_radius * phi_b.cos(), end_radius * phi_b.sin()],
            [end_radius * phi_f.cos(), end_radius * phi_f.sin()],
            z_fraction,
        ));
    }
}

/// The two wires of `other` that bracket wire `local` of `layer` in azimuth.
///
/// When the rows are aligned both slots refer to the wire directly across.
fn adjacent_row(layer: &Layer, other: &Layer, local: i64) -> (WireId, WireId) {
    let position = local as f64 + layer.offset - other.offset;
    let base = position.floor();
    let base_local = base as i64;
    if position - base < 1e-6 {
        let across = other.wire(base_local);
        (across, across)
    } else {
        (other.wire(base_local), other.wire(base_local + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3trig_core::LayerConfig;

    fn small_config() -> ChamberConfig {
        let layer = |radius: f64, shift: i16, offset: f64| LayerConfig {
            radius,
            n_wires: 16,
            shift,
            forward_z: 50.0,
            backward_z: -30.0,
            offset,
        };
        ChamberConfig {
            layers: vec![
                layer(20.0, 0, 0.0),
                layer(21.0, 0, 0.5),
                layer(22.0, 0, 0.0),
                layer(30.0, 2, 0.0),
                layer(31.0, 2, 0.5),
            ],
            dead_wires: vec![(1, 3)],
        }
    }

    #[test]
    fn test_superlayer_grouping() {
        let chamber = DriftChamber::new(&small_config()).unwrap();
        assert_eq!(chamber.superlayers().len(), 2);
        assert_eq!(chamber.superlayers()[0].n_layers(), 3);
        assert_eq!(chamber.superlayers()[1].n_layers(), 2);
        assert_eq!(chamber.axial_superlayers(), &[0]);
        assert_eq!(chamber.stereo_superlayers(), &[1]);
        assert_eq!(chamber.n_wires(), 80);
        assert_eq!(chamber.sentinel(), WireId(80));
    }

    #[test]
    fn test_neighbors_of_middle_row() {
        let chamber = DriftChamber::new(&small_config()).unwrap();
        let id = chamber.wire_id(1, 0).unwrap();
        let wire = chamber.wire(id);

        // Row 1 is offset by half a pitch: it sits between wires 0 and 1 of
        // rows 0 and 2.
        let expect = |layer, local| chamber.wire_id(layer, local).unwrap();
        assert_eq!(wire.neighbor(Neighbor::InnerLeft), expect(0, 0));
        assert_eq!(wire.neighbor(Neighbor::InnerRight), expect(0, 1));
        assert_eq!(wire.neighbor(Neighbor::Left), expect(1, 15));
        assert_eq!(wire.neighbor(Neighbor::Right), expect(1, 1));
        assert_eq!(wire.neighbor(Neighbor::OuterLeft), expect(2, 0));
        assert_eq!(wire.neighbor(Neighbor::OuterRight), expect(2, 1));
    }

    #[test]
    fn test_boundary_rows_use_sentinel() {
        let chamber = DriftChamber::new(&small_config()).unwrap();
        let sentinel = chamber.sentinel();

        let innermost = chamber.wire(chamber.wire_id(0, 5).unwrap());
        assert_eq!(innermost.neighbor(Neighbor::InnerLeft), sentinel);
        assert_eq!(innermost.neighbor(Neighbor::InnerRight), sentinel);

        // Layer 2 is the last row of its superlayer even though layer 3 exists.
        let top = chamber.wire(chamber.wire_id(2, 5).unwrap());
        assert_eq!(top.neighbor(Neighbor::OuterLeft), sentinel);
        assert_eq!(top.neighbor(Neighbor::OuterRight), sentinel);

        let first_stereo = chamber.wire(chamber.wire_id(3, 5).unwrap());
        assert_eq!(first_stereo.neighbor(Neighbor::InnerLeft), sentinel);
    }

    #[test]
    fn test_neighbor_relation_is_symmetric() {
        let chamber = DriftChamber::new(&ChamberConfig::standard()).unwrap();
        let sentinel = chamber.sentinel();
        for index in 0..chamber.n_wires() {
            let id = WireId(index as u32);
            for &neighbor in chamber.wire(id).neighbors() {
                if neighbor == sentinel {
                    continue;
                }
                assert!(
                    chamber.wire(neighbor).neighbors().contains(&id),
                    "{id:?} -> {neighbor:?} is not reciprocal"
                );
            }
        }
    }

    #[test]
    fn test_lookup_bounds_and_dead_wires() {
        let chamber = DriftChamber::new(&small_config()).unwrap();
        assert!(chamber.wire_id(5, 0).is_err());
        assert!(chamber.wire_id(0, 16).is_err());

        let dead = chamber.wire(chamber.wire_id(1, 3).unwrap());
        assert!(dead.state().is_blocked());
        assert!(chamber.wire(chamber.sentinel()).state().is_blocked());

        let bad = small_config().with_dead_wire(9, 0);
        assert!(DriftChamber::new(&bad).is_err());
    }

    #[test]
    fn test_stereo_wire_crosses_reference_radius() {
        let chamber = DriftChamber::new(&small_config()).unwrap();
        let wire = chamber.wire(chamber.wire_id(3, 4).unwrap());
        assert!(wire.direction()[0].abs() + wire.direction()[1].abs() > 0.0);

        // Halfway along the wire the radius equals the layer radius.
        let mid = [
            wire.backward()[0] + 0.5 * wire.direction()[0],
            wire.backward()[1] + 0.5 * wire.direction()[1],
        ];
        assert!((mid[0].hypot(mid[1]) - 30.0).abs() < 1e-9);

        let axial = chamber.wire(chamber.wire_id(0, 4).unwrap());
        assert_eq!(axial.direction(), [0.0, 0.0]);
        let [x, y] = axial.position();
        assert!((x.hypot(y) - 20.0).abs() < 1e-9);
    }
}
