//! Wire layers and superlayers.
#![allow(clippy::cast_precision_loss, clippy::cast_lossless)]

use crate::wire::WireId;

/// One row of sense wires.
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) id: u16,
    pub(crate) superlayer: usize,
    pub(crate) row: usize,
    pub(crate) radius: f64,
    pub(crate) n_wires: u16,
    pub(crate) first_wire: u32,
    pub(crate) offset: f64,
    pub(crate) shift: i16,
    pub(crate) forward_z: f64,
    pub(crate) backward_z: f64,
    pub(crate) cell_size: f64,
}

impl Layer {
    /// Global layer id.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Superlayer this layer belongs to.
    #[must_use]
    pub fn superlayer(&self) -> usize {
        self.superlayer
    }

    /// Row of this layer inside its superlayer (0 = innermost).
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Sense-wire radius at z = 0 (cm).
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of wires.
    #[must_use]
    pub fn n_wires(&self) -> u16 {
        self.n_wires
    }

    /// Stereo shift in half wire pitches.
    #[must_use]
    pub fn shift(&self) -> i16 {
        self.shift
    }

    /// Returns true for layers parallel to the beam axis.
    #[must_use]
    pub fn is_axial(&self) -> bool {
        self.shift == 0
    }

    /// Forward and backward endplate z (cm).
    #[must_use]
    pub fn z_range(&self) -> (f64, f64) {
        (self.backward_z, self.forward_z)
    }

    /// Azimuthal size of one cell at the layer radius (cm).
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Azimuthal pitch between neighboring wires (rad).
    #[must_use]
    pub fn pitch(&self) -> f64 {
        std::f64::consts::TAU / f64::from(self.n_wires)
    }

    /// Handle of local wire `local`, taken modulo the wire count.
    #[must_use]
    pub fn wire(&self, local: i64) -> WireId {
        let n = i64::from(self.n_wires);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wrapped = local.rem_euclid(n) as u32;
        WireId(self.first_wire + wrapped)
    }
}

/// A group of adjacent layers sharing wire count and stereo shift.
#[derive(Debug, Clone)]
pub struct SuperLayer {
    pub(crate) id: usize,
    pub(crate) first_layer: usize,
    pub(crate) n_layers: usize,
    pub(crate) shift: i16,
    pub(crate) n_wires: u16,
}

impl SuperLayer {
    /// Superlayer index (0 = innermost).
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Global id of the innermost layer.
    #[must_use]
    pub fn first_layer(&self) -> usize {
        self.first_layer
    }

    /// Number of rows.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    /// Wires per row.
    #[must_use]
    pub fn n_wires(&self) -> u16 {
        self.n_wires
    }

    /// Returns true for axial superlayers.
    #[must_use]
    pub fn is_axial(&self) -> bool {
        self.shift == 0
    }

    /// Global layer ids of this superlayer, innermost first.
    #[must_use]
    pub fn layers(&self) -> std::ops::Range<usize> {
        self.first_layer..self.first_layer + self.n_layers
    }
}
