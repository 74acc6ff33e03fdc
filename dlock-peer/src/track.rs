//! The circuit cars drive: two loops joined by a single-lane bridge.
//!
//! ```text
//!   .-.               .-.
//!  (   )=============(   )
//!   '-'    bridge     '-'
//!  west               east
//! ```
//!
//! One lap runs the west loop, crosses the bridge eastwards, runs the east
//! loop and crosses back westwards.

use std::f64::consts::TAU;
use std::ops::Range;

use dlock_core::{GroupId, NodeId};
use rand::Rng;
use serde::Serialize;

const LOOP_POINTS: usize = 60;
const BRIDGE_POINTS: usize = 30;
const LOOP_RADIUS: f64 = 100.0;
const WEST_CENTRE: (f64, f64) = (150.0, 300.0);
const EAST_CENTRE: (f64, f64) = (650.0, 300.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Travel direction over the bridge. Doubles as the critical-section group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    East,
    West,
}

impl Direction {
    /// Even ids start on the west loop heading east.
    #[must_use]
    pub fn initial(id: NodeId) -> Self {
        if id.0 % 2 == 0 {
            Direction::East
        } else {
            Direction::West
        }
    }

    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    #[must_use]
    pub fn group(self) -> GroupId {
        match self {
            Direction::East => GroupId::new("east"),
            Direction::West => GroupId::new("west"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    path: Vec<Position>,
    loop_len: usize,
    bridge_len: usize,
}

impl Track {
    #[must_use]
    pub fn generate() -> Self {
        let west_start = (WEST_CENTRE.0 + LOOP_RADIUS, WEST_CENTRE.1);
        let east_start = (EAST_CENTRE.0 - LOOP_RADIUS, EAST_CENTRE.1);

        let west_loop = circle(WEST_CENTRE, 0.0);
        let bridge = line(west_start, east_start);
        let east_loop = circle(EAST_CENTRE, TAU / 2.0);
        let bridge_back = bridge.iter().rev().copied();

        let mut path = west_loop;
        path.extend(&bridge);
        path.extend(east_loop);
        path.extend(bridge_back);

        Self {
            path,
            loop_len: LOOP_POINTS,
            bridge_len: BRIDGE_POINTS,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    #[must_use]
    pub fn position(&self, step: usize) -> Position {
        self.path[step % self.path.len()]
    }

    /// Heading in radians from `step` towards the next point.
    #[must_use]
    pub fn angle(&self, step: usize) -> f64 {
        let here = self.position(step);
        let next = self.position(step + 1);
        f64::from(next.y - here.y).atan2(f64::from(next.x - here.x))
    }

    /// Step at which a car heading `direction` needs the bridge.
    #[must_use]
    pub fn bridge_entry(&self, direction: Direction) -> usize {
        match direction {
            Direction::East => self.loop_len,
            Direction::West => 2 * self.loop_len + self.bridge_len,
        }
    }

    /// Step at which a car heading `direction` has crossed.
    #[must_use]
    pub fn bridge_exit(&self, direction: Direction) -> usize {
        match direction {
            Direction::East => self.loop_len + self.bridge_len,
            Direction::West => self.path.len() - 1,
        }
    }

    /// Steps of the loop a car heading `direction` starts on.
    #[must_use]
    pub fn start_region(&self, direction: Direction) -> Range<usize> {
        match direction {
            Direction::East => 0..self.loop_len,
            Direction::West => {
                let start = self.loop_len + self.bridge_len;
                start..start + self.loop_len
            }
        }
    }

    pub fn random_start(&self, direction: Direction, rng: &mut impl Rng) -> usize {
        rng.random_range(self.start_region(direction))
    }
}

fn circle(centre: (f64, f64), start_angle: f64) -> Vec<Position> {
    (0..LOOP_POINTS)
        .map(|i| {
            #[expect(clippy::cast_precision_loss)]
            let angle = start_angle + TAU * i as f64 / LOOP_POINTS as f64;
            point(
                centre.0 + LOOP_RADIUS * angle.cos(),
                centre.1 + LOOP_RADIUS * angle.sin(),
            )
        })
        .collect()
}

fn line(from: (f64, f64), to: (f64, f64)) -> Vec<Position> {
    (0..BRIDGE_POINTS)
        .map(|i| {
            #[expect(clippy::cast_precision_loss)]
            let t = i as f64 / BRIDGE_POINTS as f64;
            point(from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t)
        })
        .collect()
}

#[expect(clippy::cast_possible_truncation)]
fn point(x: f64, y: f64) -> Position {
    Position {
        x: x.round() as i32,
        y: y.round() as i32,
    }
}
