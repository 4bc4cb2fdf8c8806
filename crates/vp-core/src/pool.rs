use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four regenerating resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Health,
    Mana,
    Stamina,
    Essence,
}

impl Pool {
    pub const ALL: [Pool; 4] = [Pool::Health, Pool::Mana, Pool::Stamina, Pool::Essence];

    pub fn as_str(self) -> &'static str {
        match self {
            Pool::Health => "health",
            Pool::Mana => "mana",
            Pool::Stamina => "stamina",
            Pool::Essence => "essence",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(Pool::Health),
            "mana" => Ok(Pool::Mana),
            "stamina" => Ok(Pool::Stamina),
            "essence" => Ok(Pool::Essence),
            other => Err(format!("unknown pool: {other}")),
        }
    }
}

/// The pool a spend is tagged with. Only Mana and Stamina can be intents;
/// Health absorbs overflow and Essence only ever receives credits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Mana,
    #[default]
    Stamina,
}

impl Intent {
    pub fn pool(self) -> Pool {
        match self {
            Intent::Mana => Pool::Mana,
            Intent::Stamina => Pool::Stamina,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.pool().as_str()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Pool>()? {
            Pool::Mana => Ok(Intent::Mana),
            Pool::Stamina => Ok(Intent::Stamina),
            other => Err(format!("{other} cannot be a spend intent")),
        }
    }
}

/// A value for each pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerPool<T> {
    pub health: T,
    pub mana: T,
    pub stamina: T,
    pub essence: T,
}

impl<T> PerPool<T> {
    pub fn from_fn(mut f: impl FnMut(Pool) -> T) -> Self {
        Self {
            health: f(Pool::Health),
            mana: f(Pool::Mana),
            stamina: f(Pool::Stamina),
            essence: f(Pool::Essence),
        }
    }

    pub fn get(&self, pool: Pool) -> &T {
        match pool {
            Pool::Health => &self.health,
            Pool::Mana => &self.mana,
            Pool::Stamina => &self.stamina,
            Pool::Essence => &self.essence,
        }
    }

    pub fn get_mut(&mut self, pool: Pool) -> &mut T {
        match pool {
            Pool::Health => &mut self.health,
            Pool::Mana => &mut self.mana,
            Pool::Stamina => &mut self.stamina,
            Pool::Essence => &mut self.essence,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Pool, &T) -> U) -> PerPool<U> {
        PerPool::from_fn(|pool| f(pool, self.get(pool)))
    }

    /// Iterate in canonical order: health, mana, stamina, essence.
    pub fn iter(&self) -> impl Iterator<Item = (Pool, &T)> {
        Pool::ALL.into_iter().map(move |pool| (pool, self.get(pool)))
    }
}

/// Minor-unit amounts per pool (allocations, headroom, liabilities).
pub type PoolAmounts = PerPool<f64>;

impl PerPool<f64> {
    pub fn splat(value: f64) -> Self {
        Self::from_fn(|_| value)
    }

    pub fn sum(&self) -> f64 {
        self.health + self.mana + self.stamina + self.essence
    }

    pub fn add_assign(&mut self, other: &PoolAmounts) {
        for pool in Pool::ALL {
            *self.get_mut(pool) += *other.get(pool);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.iter().all(|(_, v)| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_parse_roundtrip() {
        for pool in Pool::ALL {
            assert_eq!(pool.as_str().parse::<Pool>().unwrap(), pool);
        }
        assert_eq!(" Mana ".parse::<Pool>().unwrap(), Pool::Mana);
        assert!("gold".parse::<Pool>().is_err());
    }

    #[test]
    fn test_intent_rejects_non_spend_pools() {
        assert_eq!("mana".parse::<Intent>().unwrap(), Intent::Mana);
        assert!("health".parse::<Intent>().is_err());
        assert!("essence".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_defaults_to_stamina() {
        assert_eq!(Intent::default(), Intent::Stamina);
    }

    #[test]
    fn test_per_pool_accessors() {
        let mut amounts = PoolAmounts::default();
        *amounts.get_mut(Pool::Stamina) += 4.0;
        amounts.add_assign(&PoolAmounts::splat(1.0));
        assert_eq!(amounts.stamina, 5.0);
        assert_eq!(amounts.sum(), 8.0);

        let order: Vec<Pool> = amounts.iter().map(|(p, _)| p).collect();
        assert_eq!(order, Pool::ALL.to_vec());
    }

    #[test]
    fn test_serde_lowercase_names() {
        let json = serde_json::to_string(&Pool::Essence).unwrap();
        assert_eq!(json, "\"essence\"");
        let intent: Intent = serde_json::from_str("\"mana\"").unwrap();
        assert_eq!(intent, Intent::Mana);
    }
}
