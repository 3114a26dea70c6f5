//! Layered layout engine
//!
//! Components are grouped into fixed layers by kind and laid out left to
//! right within each layer, top to bottom across layers. Empty layers take
//! no vertical space.

use crate::diagram::component::{ComponentKind, Position};
use crate::diagram::model::Diagram;

use serde::{Deserialize, Serialize};

/// Layers in placement order, top to bottom.
pub const LAYERS: &[&[ComponentKind]] = &[
    &[ComponentKind::Vpc],
    &[ComponentKind::Subnet],
    &[
        ComponentKind::SecurityGroup,
        ComponentKind::InternetGateway,
        ComponentKind::NatGateway,
    ],
    &[ComponentKind::Ec2Instance, ComponentKind::RdsInstance],
    &[
        ComponentKind::LoadBalancer,
        ComponentKind::ApiGateway,
        ComponentKind::LambdaFunction,
    ],
    &[ComponentKind::S3Bucket, ComponentKind::DynamoDbTable],
];

/// Layout geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// X of the first component in every layer
    pub start_x: f64,
    /// Y of the first non-empty layer
    pub start_y: f64,
    /// Distance between neighbours in a layer
    pub horizontal_spacing: f64,
    /// Distance between consecutive non-empty layers
    pub vertical_spacing: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            start_x: 50.0,
            start_y: 50.0,
            horizontal_spacing: 250.0,
            vertical_spacing: 200.0,
        }
    }
}

/// Layered layout engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: LayoutOptions,
}

impl Engine {
    /// Create an engine with the given geometry
    #[must_use]
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }

    /// Set the spacing between components
    pub fn set_spacing(&mut self, horizontal: f64, vertical: f64) -> &mut Self {
        self.options.horizontal_spacing = horizontal;
        self.options.vertical_spacing = vertical;
        self
    }

    /// Position every layered component of `diagram`.
    ///
    /// Components of kinds outside [`LAYERS`] (the region root) keep their
    /// position. Within a layer, registration order decides left to right.
    pub fn apply(&self, diagram: &mut Diagram) {
        let mut y = self.options.start_y;

        for layer in LAYERS {
            let members: Vec<_> = diagram
                .components()
                .filter(|c| layer.contains(&c.kind))
                .map(|c| c.id)
                .collect();
            if members.is_empty() {
                continue;
            }

            for (i, id) in members.iter().enumerate() {
                if let Some(component) = diagram.component_mut(*id) {
                    component.position = Position {
                        x: self.options.start_x + i as f64 * self.options.horizontal_spacing,
                        y,
                    };
                }
            }

            tracing::trace!(layer = ?layer, components = members.len(), y, "Laid out layer");
            y += self.options.vertical_spacing;
        }
    }
}
