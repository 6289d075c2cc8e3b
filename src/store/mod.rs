//! In-memory car repository backing the REST resource.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A car record as stored by the repository and sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: u64,
    pub number_plate: String,
    pub year: i32,
    pub last_modified: DateTime<Utc>,
}

impl Car {
    /// A car with the default attributes the repository assigns to `id`.
    pub fn generated(id: u64, at: DateTime<Utc>) -> Self {
        Self {
            id,
            number_plate: plate_for(id),
            year: 1990 + (id.wrapping_mul(7) % 35) as i32,
            last_modified: at,
        }
    }
}

// Deterministic plate in the `AB-1234` shape so runs are reproducible.
fn plate_for(id: u64) -> String {
    let letters = b"ABCDEFGHJKLMNPRSTUVWXYZ";
    let n = letters.len() as u64;
    let mixed = id.wrapping_mul(2_654_435_761);
    let first = letters[(mixed % n) as usize] as char;
    let second = letters[((mixed / n) % n) as usize] as char;
    format!("{first}{second}-{:04}", mixed % 10_000)
}

/// Which record counts as the "last" one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LastPolicy {
    /// The record with the highest identifier.
    #[default]
    HighestId,
    /// The record touched most recently; ties go to the higher identifier.
    MostRecentlyModified,
}

#[derive(Debug, Default)]
struct Inner {
    cars: BTreeMap<u64, Car>,
    version: u64,
    // Newest timestamp ever handed out or inserted, including deleted records.
    stamp: Option<DateTime<Utc>>,
}

impl Inner {
    // Validators carry millisecond precision, so every timestamp handed out
    // lands on a later millisecond than the one before it.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let at = match self.stamp {
            Some(prev) if prev.timestamp_millis() >= now.timestamp_millis() => {
                prev.trunc_subsecs(3) + Duration::milliseconds(1)
            }
            _ => now,
        };
        self.stamp = Some(at);
        at
    }
}

/// Thread-safe store of [`Car`] records keyed by identifier.
///
/// Every mutation bumps [`version`](Self::version), which the REST resource
/// uses as the collection's entity tag.
#[derive(Debug, Default)]
pub struct CarRepository {
    inner: RwLock<Inner>,
    policy: LastPolicy,
}

impl CarRepository {
    pub fn new(policy: LastPolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
        }
    }

    pub fn policy(&self) -> LastPolicy {
        self.policy
    }

    /// Creates a car with generated attributes and the next free identifier.
    pub fn create(&self) -> Car {
        let mut inner = self.inner.write();
        let id = inner.cars.keys().next_back().map_or(1, |max| max + 1);
        let car = Car::generated(id, inner.next_timestamp());
        inner.cars.insert(id, car.clone());
        inner.version += 1;
        car
    }

    /// Stores `car` as-is, replacing any record with the same identifier.
    pub fn insert(&self, car: Car) {
        let mut inner = self.inner.write();
        inner.stamp = inner.stamp.max(Some(car.last_modified));
        inner.cars.insert(car.id, car);
        inner.version += 1;
    }

    pub fn get(&self, id: u64) -> Option<Car> {
        self.inner.read().cars.get(&id).cloned()
    }

    /// All cars ordered by identifier.
    pub fn list(&self) -> Vec<Car> {
        self.inner.read().cars.values().cloned().collect()
    }

    /// The listing together with the version it was taken at.
    pub fn snapshot(&self) -> (Vec<Car>, u64) {
        let inner = self.inner.read();
        (inner.cars.values().cloned().collect(), inner.version)
    }

    /// Marks the car as modified now and returns the updated record.
    pub fn touch(&self, id: u64) -> Option<Car> {
        let mut inner = self.inner.write();
        let at = inner.next_timestamp();
        let car = inner.cars.get_mut(&id)?;
        car.last_modified = at;
        let car = car.clone();
        inner.version += 1;
        Some(car)
    }

    /// Removes the car. Returns `false` if it did not exist.
    pub fn delete(&self, id: u64) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.cars.remove(&id).is_some();
        if removed {
            inner.version += 1;
        }
        removed
    }

    /// Identifier of the last record under the repository's [`LastPolicy`].
    pub fn last_id(&self) -> Option<u64> {
        let inner = self.inner.read();
        match self.policy {
            LastPolicy::HighestId => inner.cars.keys().next_back().copied(),
            LastPolicy::MostRecentlyModified => inner
                .cars
                .values()
                .max_by_key(|c| (c.last_modified, c.id))
                .map(|c| c.id),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().cars.is_empty()
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// The newest `last_modified` across the collection.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.inner.read().cars.values().map(|c| c.last_modified).max()
    }
}
