use character_actions::DirectionKeys;

/// Logical keys held during one frame. Edges are derived by the controller
/// from consecutive snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub run: bool,
    pub jump: bool,
    pub sit: bool,
}

impl InputSnapshot {
    /// Maps raw key names to logical keys. Unknown names are ignored.
    pub fn from_key_names<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for key in keys {
            match key.as_ref().trim().to_ascii_lowercase().as_str() {
                "w" => snapshot.forward = true,
                "s" => snapshot.back = true,
                "a" => snapshot.left = true,
                "d" => snapshot.right = true,
                "shift" => snapshot.run = true,
                "space" | " " => snapshot.jump = true,
                "c" => snapshot.sit = true,
                other => log::trace!("ignoring unmapped key {other:?}"),
            }
        }
        snapshot
    }

    pub fn directions(&self) -> DirectionKeys {
        DirectionKeys {
            forward: self.forward,
            back: self.back,
            left: self.left,
            right: self.right,
        }
    }
}

/// Key-down edges between two snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputEdges {
    pub jump_pressed: bool,
    pub sit_pressed: bool,
}

impl InputEdges {
    pub fn between(previous: &InputSnapshot, current: &InputSnapshot) -> Self {
        Self {
            jump_pressed: current.jump && !previous.jump,
            sit_pressed: current.sit && !previous.sit,
        }
    }
}
