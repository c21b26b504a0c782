use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

static OPENINGS: &[&str] = &[
    "ka", "ko", "ta", "te", "mi", "mo", "na", "ne", "sa", "so", "va", "vo", "ze", "zu", "ga",
    "gu", "pa", "pe", "ri", "ro",
];

static MIDDLES: &[&str] = &[
    "la", "li", "lo", "ra", "re", "ru", "mi", "ma", "ni", "no", "ve", "vi", "sha", "tho",
];

static ENDINGS: &[&str] = &[
    "ar", "en", "is", "on", "us", "ath", "el", "ik", "or", "an", "ys", "ul",
];

static EPITHETS: &[&str] = &["the Swift", "the Stubborn", "the Last", "the Wary", "the Hungry"];

const EPITHET_CHANCE: f64 = 0.2;
const MAX_REDRAWS: u32 = 64;

/// Hands out survivor names that are unique within one simulation.
pub struct NameRegistry {
    used: HashSet<String>,
    epithets: bool,
}

impl NameRegistry {
    pub fn new(epithets: bool) -> Self {
        Self {
            used: HashSet::new(),
            epithets,
        }
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Draw a fresh name. Collisions are redrawn; once redraws run out a
    /// numeric tag is appended instead.
    pub fn generate(&mut self, rng: &mut impl Rng) -> String {
        for _ in 0..MAX_REDRAWS {
            let name = self.draw(rng);
            if self.used.insert(name.clone()) {
                return name;
            }
        }

        let base = self.draw(rng);
        let mut n = 2;
        loop {
            let tagged = format!("{base} {n}");
            if self.used.insert(tagged.clone()) {
                return tagged;
            }
            n += 1;
        }
    }

    fn draw(&self, rng: &mut impl Rng) -> String {
        let syllables = rng.gen_range(2..=3);
        let mut name = String::new();
        for i in 0..syllables {
            let table = if i == 0 {
                OPENINGS
            } else if i == syllables - 1 {
                ENDINGS
            } else {
                MIDDLES
            };
            if let Some(part) = table.choose(rng) {
                name.push_str(part);
            }
        }
        let mut name = capitalise(&name);
        if self.epithets && rng.gen_bool(EPITHET_CHANCE) {
            if let Some(epithet) = EPITHETS.choose(rng) {
                name.push(' ');
                name.push_str(epithet);
            }
        }
        name
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn names_are_capitalised_and_unique() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut registry = NameRegistry::new(false);
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            let name = registry.generate(&mut rng);
            assert!(name.chars().next().unwrap().is_uppercase());
            assert!(seen.insert(name));
        }
        assert_eq!(registry.len(), 2_000);
    }

    #[test]
    fn same_seed_same_names() {
        let mut a = NameRegistry::new(true);
        let mut b = NameRegistry::new(true);
        let mut ra = ChaCha8Rng::seed_from_u64(3);
        let mut rb = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(a.generate(&mut ra), b.generate(&mut rb));
        }
    }

    #[test]
    fn epithets_appear_only_when_enabled() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut plain = NameRegistry::new(false);
        assert!((0..300).all(|_| !plain.generate(&mut rng).contains(" the ")));

        let mut fancy = NameRegistry::new(true);
        assert!((0..300).any(|_| fancy.generate(&mut rng).contains(" the ")));
    }
}
