use serde::{Deserialize, Serialize};

/// Stable survivor handle. Ids are handed out in creation order and never reused,
/// so ordering by id is ordering by creation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct SurvivorId(pub u32);

/// Food handle. A food keeps its id across depletion and respawn.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct FoodId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EntityKind {
    Survivor,
    Food,
    Danger,
}

/// Anything the spatial index can hold.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum EntityHandle {
    Survivor(SurvivorId),
    Food(FoodId),
    Danger,
}

impl EntityHandle {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityHandle::Survivor(_) => EntityKind::Survivor,
            EntityHandle::Food(_) => EntityKind::Food,
            EntityHandle::Danger => EntityKind::Danger,
        }
    }

    pub fn survivor(&self) -> Option<SurvivorId> {
        match self {
            EntityHandle::Survivor(id) => Some(*id),
            _ => None,
        }
    }

    pub fn food(&self) -> Option<FoodId> {
        match self {
            EntityHandle::Food(id) => Some(*id),
            _ => None,
        }
    }
}

/// Which kinds a spatial query should return.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct KindFilter {
    pub survivors: bool,
    pub food: bool,
    pub danger: bool,
}

impl KindFilter {
    pub const ALL: Self = Self {
        survivors: true,
        food: true,
        danger: true,
    };
    pub const SURVIVORS: Self = Self {
        survivors: true,
        food: false,
        danger: false,
    };
    pub const FOOD: Self = Self {
        survivors: false,
        food: true,
        danger: false,
    };
    pub const DANGER: Self = Self {
        survivors: false,
        food: false,
        danger: true,
    };

    pub fn accepts(&self, handle: EntityHandle) -> bool {
        match handle.kind() {
            EntityKind::Survivor => self.survivors,
            EntityKind::Food => self.food,
            EntityKind::Danger => self.danger,
        }
    }
}
