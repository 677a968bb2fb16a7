//! Passport codes: the human-typed `PPP-SSS` student credential.
//!
//! The prefix comes from a fixed animal-type table; the suffix is random over
//! an alphabet with the easily confused characters removed. Global uniqueness
//! is enforced by the student table's constraint, not here.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

/// Suffix alphabet. 0/O, 1/I/L are excluded so codes survive being read
/// aloud or copied from a whiteboard.
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Maximum generation attempts against the uniqueness constraint before the
/// caller must fail loudly. No weak fallback past this point.
pub const MAX_GENERATION_ATTEMPTS: u32 = 8;

static CODE_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9]{3}-[A-Z0-9]{3}$").expect("passport code regex is valid")
});

/// Animal types assigned to classes; each maps to a fixed code prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Animal {
    Fox,
    Owl,
    Bee,
    Cat,
    Elk,
    Ram,
    Bat,
    Pig,
    Hen,
    Ant,
}

impl Animal {
    pub const ALL: [Self; 10] = [
        Self::Fox,
        Self::Owl,
        Self::Bee,
        Self::Cat,
        Self::Elk,
        Self::Ram,
        Self::Bat,
        Self::Pig,
        Self::Hen,
        Self::Ant,
    ];

    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Fox => "FOX",
            Self::Owl => "OWL",
            Self::Bee => "BEE",
            Self::Cat => "CAT",
            Self::Elk => "ELK",
            Self::Ram => "RAM",
            Self::Bat => "BAT",
            Self::Pig => "PIG",
            Self::Hen => "HEN",
            Self::Ant => "ANT",
        }
    }
}

/// Lexical format check, applied before any backing-store lookup.
#[must_use]
pub fn is_valid_format(code: &str) -> bool {
    CODE_FORMAT.is_match(code)
}

/// One candidate code for the given animal type. Collision handling is the
/// caller's job (retry up to [`MAX_GENERATION_ATTEMPTS`], then error).
#[must_use]
pub fn generate_code(animal: Animal) -> String {
    let mut rng = rand::thread_rng();
    let mut suffix = String::with_capacity(3);
    for _ in 0..3 {
        let index = rng.gen_range(0..SUFFIX_ALPHABET.len());
        suffix.push(SUFFIX_ALPHABET[index] as char);
    }
    format!("{}-{}", animal.prefix(), suffix)
}
