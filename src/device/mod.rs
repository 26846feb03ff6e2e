//! Physical LED controllers and how their pixels sit on the shared canvas

mod mapper;
mod topology;

pub use mapper::{local_offset, map_device, sample_index, sample_points};
pub use topology::{exact_sqrt, grid_cell, infer_topology, Topology, STRIP_ASPECT_THRESHOLD};

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::geometry::Placement;

/// One controller: a rotated rectangle of pixels at a network address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub address: IpAddr,
    /// Overrides the engine's protocol port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub pixel_count: u32,
    #[serde(flatten)]
    pub placement: Placement,
    /// Absent: infer; 0: linear strip; n: row-major matrix with n columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_width: Option<u32>,
    /// Odd matrix rows run right-to-left
    #[serde(default)]
    pub serpentine: bool,
}

impl Device {
    pub fn new(id: impl Into<String>, address: IpAddr, pixel_count: u32, placement: Placement) -> Self {
        Self {
            id: id.into(),
            address,
            port: None,
            pixel_count,
            placement,
            segment_width: None,
            serpentine: false,
        }
    }

    pub fn strip(mut self) -> Self {
        self.segment_width = Some(0);
        self
    }

    pub fn matrix(mut self, columns: u32, serpentine: bool) -> Self {
        self.segment_width = Some(columns);
        self.serpentine = serpentine;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Resolved pixel layout; falls back to [`infer_topology`] when unset
    pub fn topology(&self) -> Topology {
        match self.segment_width {
            Some(0) => Topology::Strip,
            Some(columns) => Topology::matrix(self.pixel_count, columns, self.serpentine),
            None => infer_topology(
                self.pixel_count,
                self.placement.width,
                self.placement.height,
            ),
        }
    }

    pub fn socket_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::new(self.address, self.port.unwrap_or(default_port))
    }

    /// Payload length on the wire
    pub fn frame_len(&self) -> usize {
        self.pixel_count as usize * 3
    }

    pub(crate) fn validate(&self) -> EngineResult<()> {
        match self.placement.problem() {
            None => Ok(()),
            Some(reason) => Err(EngineError::invalid_geometry(&self.id, reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn device() -> Device {
        Device::new(
            "panel",
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            64,
            Placement::new(0.0, 0.0, 100.0, 100.0),
        )
    }

    #[test]
    fn explicit_segment_width_wins() {
        assert_eq!(device().strip().topology(), Topology::Strip);
        assert_eq!(
            device().matrix(8, true).topology(),
            Topology::Matrix {
                columns: 8,
                rows: 8,
                serpentine: true
            }
        );
    }

    #[test]
    fn unset_segment_width_is_inferred() {
        assert_eq!(
            device().topology(),
            Topology::Matrix {
                columns: 8,
                rows: 8,
                serpentine: false
            }
        );
    }

    #[test]
    fn port_override() {
        assert_eq!(device().socket_addr(21324).port(), 21324);
        assert_eq!(device().with_port(4048).socket_addr(21324).port(), 4048);
    }

    #[test]
    fn json_flattens_placement() {
        let json = r#"{
            "id": "strip-1",
            "address": "192.168.1.50",
            "pixel_count": 30,
            "x": 10.0, "y": 20.0, "width": 300.0, "height": 10.0, "rotation": 15.0,
            "segment_width": 0
        }"#;
        let d: Device = serde_json::from_str(json).unwrap();
        assert_eq!(d.placement, Placement::new(10.0, 20.0, 300.0, 10.0).with_rotation(15.0));
        assert_eq!(d.topology(), Topology::Strip);
        assert_eq!(d.frame_len(), 90);
        assert!(!d.serpentine);
    }

    #[test]
    fn non_finite_placement_is_rejected() {
        let mut d = device();
        d.placement.rotation = f64::INFINITY;
        assert!(matches!(d.validate(), Err(EngineError::InvalidGeometry { .. })));
    }
}
