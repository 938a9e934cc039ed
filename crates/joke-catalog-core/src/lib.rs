use std::fmt::{Display, Formatter};
use std::num::IntErrorKind;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

pub type JokeId = u32;

pub const EXTENDED_JOKE_COUNT: JokeId = 100;
pub const JOKES_PER_PAGE: JokeId = 10;
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("joke {0} not found")]
    NotFound(JokeLookup),
    #[error("invalid joke id: {0:?}")]
    InvalidId(String),
    #[error("invalid pagination parameters: {0}")]
    InvalidPagination(String),
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JokeType {
    Single,
    Twopart,
}

impl JokeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Twopart => "twopart",
        }
    }
}

impl Display for JokeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific text of a joke. Serialized with the `type` tag inline, so a
/// single joke carries only `joke` and a two-part joke only `setup`/`delivery`.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Hash)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JokeBody {
    Single { joke: String },
    Twopart { setup: String, delivery: String },
}

impl JokeBody {
    #[must_use]
    pub fn single(joke: impl Into<String>) -> Self {
        Self::Single { joke: joke.into() }
    }

    #[must_use]
    pub fn two_part(setup: impl Into<String>, delivery: impl Into<String>) -> Self {
        Self::Twopart { setup: setup.into(), delivery: delivery.into() }
    }

    #[must_use]
    pub fn kind(&self) -> JokeType {
        match self {
            Self::Single { .. } => JokeType::Single,
            Self::Twopart { .. } => JokeType::Twopart,
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Joke {
    pub id: JokeId,
    #[serde(flatten)]
    pub body: JokeBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<JokeId>,
}

impl Joke {
    #[must_use]
    pub fn new(id: JokeId, body: JokeBody) -> Self {
        Self { id, body, page: None }
    }

    #[must_use]
    pub fn kind(&self) -> JokeType {
        self.body.kind()
    }
}

/// Flat shape returned by a successful delete. Text fields that do not apply
/// to the joke's type are empty strings.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct DeletedJoke {
    pub id: JokeId,
    #[serde(rename = "type")]
    pub kind: JokeType,
    pub setup: String,
    pub delivery: String,
    pub joke: String,
}

impl From<Joke> for DeletedJoke {
    fn from(value: Joke) -> Self {
        let kind = value.kind();
        let (joke, setup, delivery) = match value.body {
            JokeBody::Single { joke } => (joke, String::new(), String::new()),
            JokeBody::Twopart { setup, delivery } => (String::new(), setup, delivery),
        };
        Self { id: value.id, kind, setup, delivery, joke }
    }
}

/// The ten canonical jokes every store starts from.
#[must_use]
pub fn seed_jokes() -> Vec<Joke> {
    vec![
        Joke::new(
            1,
            JokeBody::single("Why do programmers prefer dark mode? Because light attracts bugs!"),
        ),
        Joke::new(
            2,
            JokeBody::two_part(
                "Why did the developer go broke?",
                "Because he used up all his cache.",
            ),
        ),
        Joke::new(3, JokeBody::single("A SQL query walks into a bar and asks: \"Can I JOIN you?\"")),
        Joke::new(
            4,
            JokeBody::two_part("Why do Java developers wear glasses?", "Because they don’t C#."),
        ),
        Joke::new(
            5,
            JokeBody::single(
                "There are 10 kinds of people: those who understand binary and those who don’t.",
            ),
        ),
        Joke::new(
            6,
            JokeBody::two_part(
                "Why was the JavaScript developer sad?",
                "Because he didn’t know how to null his feelings.",
            ),
        ),
        Joke::new(
            7,
            JokeBody::single(
                "Debugging: Being the detective in a crime movie where you are also the murderer.",
            ),
        ),
        Joke::new(
            8,
            JokeBody::two_part("Why did the function return early?", "Because it had a timeout."),
        ),
        Joke::new(9, JokeBody::single("Programmers don’t panic — they debug.")),
        Joke::new(
            10,
            JokeBody::two_part(
                "Why did the programmer quit his job?",
                "Because he didn’t get arrays.",
            ),
        ),
    ]
}

/// 1-based block of [`JOKES_PER_PAGE`] extended records containing `id`.
#[must_use]
pub fn page_for(id: JokeId) -> JokeId {
    id.div_ceil(JOKES_PER_PAGE)
}

/// Target of an id lookup. Integers that no record can carry, negative or
/// too large for [`JokeId`], become [`JokeLookup::OutOfRange`] and match nothing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JokeLookup {
    Id(JokeId),
    OutOfRange,
}

impl JokeLookup {
    fn matches(self, joke: &Joke) -> bool {
        self == Self::Id(joke.id)
    }
}

impl Display for JokeLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::OutOfRange => f.write_str("<out of range>"),
        }
    }
}

/// Parses a joke id taken from a request path.
///
/// # Errors
/// Returns [`CatalogError::InvalidId`] when `raw` is not an integer.
pub fn parse_joke_id(raw: &str) -> Result<JokeLookup, CatalogError> {
    match raw.trim().parse::<i64>() {
        Ok(value) => Ok(JokeId::try_from(value).map_or(JokeLookup::OutOfRange, JokeLookup::Id)),
        Err(err) if matches!(err.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            Ok(JokeLookup::OutOfRange)
        }
        Err(_) => Err(CatalogError::InvalidId(raw.to_string())),
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, limit: DEFAULT_LIMIT }
    }
}

impl PageRequest {
    /// # Errors
    /// Returns [`CatalogError::InvalidPagination`] when `page` or `limit` is zero.
    pub fn new(page: u64, limit: u64) -> Result<Self, CatalogError> {
        if page == 0 {
            return Err(CatalogError::InvalidPagination("page MUST be >= 1".to_string()));
        }
        if limit == 0 {
            return Err(CatalogError::InvalidPagination("limit MUST be >= 1".to_string()));
        }
        Ok(Self { page, limit })
    }

    /// Builds a request from raw query values. Missing or empty values fall
    /// back to [`DEFAULT_PAGE`] and [`DEFAULT_LIMIT`].
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidPagination`] when a present value is not
    /// an integer >= 1.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Result<Self, CatalogError> {
        let page = parse_positive("page", page, DEFAULT_PAGE)?;
        let limit = parse_positive("limit", limit, DEFAULT_LIMIT)?;
        Self::new(page, limit)
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

fn parse_positive(name: &str, raw: Option<&str>, default: u64) -> Result<u64, CatalogError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse::<u64>().ok().filter(|parsed| *parsed >= 1).ok_or_else(|| {
            CatalogError::InvalidPagination(format!("{name} MUST be an integer >= 1, got {value:?}"))
        }),
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u64,
    pub limit: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub count: u64,
    pub jokes: Vec<Joke>,
}

/// In-memory catalog: the canonical jokes and the extended list derived from
/// them. Only deletion mutates it after construction.
#[derive(Debug, Clone)]
pub struct JokeStore {
    canonical: Vec<Joke>,
    extended: Vec<Joke>,
}

impl Default for JokeStore {
    fn default() -> Self {
        Self::seeded()
    }
}

impl JokeStore {
    #[must_use]
    pub fn seeded() -> Self {
        Self::from_canonical(seed_jokes(), EXTENDED_JOKE_COUNT)
    }

    /// Derives `extended_len` records by cycling through `canonical`. Record
    /// `i` copies the body of canonical position `(i - 1) % canonical.len()`
    /// and is renumbered `i` with its page precomputed.
    #[must_use]
    pub fn from_canonical(canonical: Vec<Joke>, extended_len: JokeId) -> Self {
        let extended = (1..=extended_len)
            .zip(canonical.iter().cycle())
            .map(|(id, source)| Joke { id, body: source.body.clone(), page: Some(page_for(id)) })
            .collect();
        Self { canonical, extended }
    }

    #[must_use]
    pub fn canonical(&self) -> &[Joke] {
        &self.canonical
    }

    #[must_use]
    pub fn extended(&self) -> &[Joke] {
        &self.extended
    }

    /// Uniform draw over the canonical jokes.
    pub fn random<R>(&self, rng: &mut R) -> Option<&Joke>
    where
        R: Rng + ?Sized,
    {
        self.canonical.choose(rng)
    }

    /// # Errors
    /// Returns [`CatalogError::NotFound`] when no extended record matches.
    pub fn get(&self, lookup: JokeLookup) -> Result<&Joke, CatalogError> {
        self.extended
            .iter()
            .find(|joke| lookup.matches(joke))
            .ok_or(CatalogError::NotFound(lookup))
    }

    #[must_use]
    pub fn paginate(&self, request: PageRequest) -> Page {
        let len = self.extended.len();
        let total_items = u64::try_from(len).unwrap_or(u64::MAX);
        let start = usize::try_from(request.offset()).map_or(len, |start| start.min(len));
        let end = usize::try_from(request.limit)
            .map_or(len, |limit| start.saturating_add(limit).min(len));
        let jokes = self.extended[start..end].to_vec();

        Page {
            page: request.page,
            limit: request.limit,
            total_items,
            total_pages: total_items.div_ceil(request.limit.max(1)),
            count: u64::try_from(jokes.len()).unwrap_or(u64::MAX),
            jokes,
        }
    }

    /// Removes the matching extended record, and the canonical record with
    /// the same id when there is one. Returns the removed extended record.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when no extended record matches.
    pub fn delete_by_id(&mut self, lookup: JokeLookup) -> Result<Joke, CatalogError> {
        let index = self
            .extended
            .iter()
            .position(|joke| lookup.matches(joke))
            .ok_or(CatalogError::NotFound(lookup))?;
        let removed = self.extended.remove(index);

        if let Some(canonical_index) = self.canonical.iter().position(|joke| joke.id == removed.id)
        {
            self.canonical.remove(canonical_index);
        }

        Ok(removed)
    }
}
