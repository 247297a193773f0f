//! Status panel – the console's view of inbound telemetry.
//!
//! [`StatusPanel::attach`] subscribes one handler per inbound channel on a
//! [`Link`]; each handler writes into shared [`PanelState`] which `/status`
//! renders.

use std::cell::RefCell;
use std::rc::Rc;

use colored::Colorize;
use teleop_link::{Link, Transport};
use teleop_types::{
    DebugPoint, LidarScan, MapSnapshot, RobotPose, SensorReading, SteeringReport, TextMessage,
    TileUpdate,
};

/// Number of text messages kept for `/status`.
const MESSAGE_HISTORY: usize = 5;

/// Latest value seen on each inbound channel.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PanelState {
    pub messages: Vec<String>,
    pub pose: Option<RobotPose>,
    pub sensor: Option<SensorReading>,
    pub steering: Option<SteeringReport>,
    pub scan_nodes: usize,
    pub last_tile: Option<TileUpdate>,
    pub tiles_updated: usize,
    pub map_tiles: Option<usize>,
    pub point: Option<DebugPoint>,
}

impl PanelState {
    /// One line per populated field, in a fixed order.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(pose) = self.pose {
            lines.push(format!(
                "robot: x {:.2}  y {:.2}  heading {:.1}°",
                pose.x, pose.y, pose.r
            ));
        }
        if let Some(sensor) = self.sensor {
            lines.push(format!("left distance: {:.2}", sensor.left));
            lines.push(format!("right distance: {:.2}", sensor.right));
            lines.push(format!("rotation: {:.2}", sensor.rot));
        }
        if let Some(s) = self.steering {
            lines.push(format!(
                "steering: left {:.2} {}  right {:.2} {}",
                s.left_speed,
                direction(s.left_forward),
                s.right_speed,
                direction(s.right_forward)
            ));
        }
        if self.scan_nodes > 0 {
            lines.push(format!("lidar nodes: {}", self.scan_nodes));
        }
        if let Some(tile) = self.last_tile {
            lines.push(format!(
                "tiles updated: {} (last ({}, {}) = {})",
                self.tiles_updated, tile.col, tile.row, tile.kind
            ));
        }
        if let Some(n) = self.map_tiles {
            lines.push(format!("map: {n} tiles"));
        }
        if let Some(p) = self.point {
            lines.push(format!("point: ({:.1}, {:.1})", p.col, p.row));
        }
        for msg in &self.messages {
            lines.push(format!("message: {msg}"));
        }
        lines
    }
}

fn direction(forward: bool) -> &'static str {
    if forward { "fwd" } else { "rev" }
}

/// Handle to the shared panel state.
#[derive(Debug, Clone, Default)]
pub struct StatusPanel {
    state: Rc<RefCell<PanelState>>,
}

impl StatusPanel {
    /// Subscribe the panel to every inbound channel on `link`.
    pub fn attach<T: Transport>(link: &mut Link<T>) -> Self {
        let panel = StatusPanel::default();

        let s = panel.state.clone();
        link.subscribe(move |msg: TextMessage| {
            println!("  {} {}", "received message:".dimmed(), msg.text.bold());
            let mut state = s.borrow_mut();
            state.messages.push(msg.text);
            if state.messages.len() > MESSAGE_HISTORY {
                state.messages.remove(0);
            }
        });

        let s = panel.state.clone();
        link.subscribe(move |pose: RobotPose| s.borrow_mut().pose = Some(pose));

        let s = panel.state.clone();
        link.subscribe(move |reading: SensorReading| s.borrow_mut().sensor = Some(reading));

        let s = panel.state.clone();
        link.subscribe(move |report: SteeringReport| s.borrow_mut().steering = Some(report));

        let s = panel.state.clone();
        link.subscribe(move |scan: LidarScan| s.borrow_mut().scan_nodes = scan.nodes.len());

        let s = panel.state.clone();
        link.subscribe(move |tile: TileUpdate| {
            let mut state = s.borrow_mut();
            state.tiles_updated += 1;
            state.last_tile = Some(tile);
        });

        let s = panel.state.clone();
        link.subscribe(move |map: MapSnapshot| s.borrow_mut().map_tiles = Some(map.tiles.len()));

        let s = panel.state.clone();
        link.subscribe(move |point: DebugPoint| {
            s.borrow_mut().point = point.is_present().then_some(point);
        });

        panel
    }

    pub fn snapshot(&self) -> PanelState {
        self.state.borrow().clone()
    }
}
