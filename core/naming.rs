use rand::seq::SliceRandom;
use rand::Rng;

use crate::entry::ConfigEntry;
use crate::location::tag_location;

pub const DEFAULT_LABEL: &str = "Made By Valtor";
pub const FALLBACK_SYMBOL: &str = "🔷";

pub const SYMBOL_POOL: &[&str] = &[
    "🚀", "⚡", "🔥", "💎", "🌟", "✨", "💫", "⭐", "🎯", "🎨", "🎭", "🎪", "🎬", "🎮", "🎲",
    "🎰", "🎳", "🎺", "🎸", "🎻", "🎹", "🎤", "🏆", "🏅", "🏈", "🏀", "⚽", "⚾", "🥎", "🏐",
    "🏉", "🎾", "🥏", "🎱", "🏓", "🏸", "🏒", "🏑", "🥍", "🏏", "🥅", "⛳", "🎣", "🤿", "🎿",
    "🛷", "🥌", "🪀", "🪁",
];

/// Picks the decorative symbols for one naming pass.
pub trait SymbolSource {
    /// Returns `count` distinct symbols from `pool`, `count <= pool.len()`.
    fn draw(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str>;
}

/// Uniform sampling without replacement.
#[derive(Debug)]
pub struct RandomSymbols<R> {
    rng: R,
}

impl<R: Rng> RandomSymbols<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomSymbols<rand::rngs::ThreadRng> {
    pub fn thread_local() -> Self {
        Self::new(rand::thread_rng())
    }
}

impl<R: Rng> SymbolSource for RandomSymbols<R> {
    fn draw(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str> {
        let mut symbols = pool.to_vec();
        symbols.shuffle(&mut self.rng);
        symbols.truncate(count);
        symbols
    }
}

/// Takes symbols in pool order.
#[derive(Debug, Default)]
pub struct SequentialSymbols;

impl SymbolSource for SequentialSymbols {
    fn draw(&mut self, pool: &[&'static str], count: usize) -> Vec<&'static str> {
        pool.iter().take(count).copied().collect()
    }
}

#[derive(Debug, Clone)]
pub struct NamingOptions {
    pub prefix: Option<String>,
    pub include_location: bool,
    pub default_label: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            include_location: false,
            default_label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl NamingOptions {
    fn label(&self) -> &str {
        match self.prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => &self.default_label,
        }
    }
}

/// One display name per entry, numbered from 1 in entry order.
pub fn assign_names(
    entries: &[ConfigEntry],
    options: &NamingOptions,
    source: &mut dyn SymbolSource,
) -> Vec<String> {
    let drawn = source.draw(SYMBOL_POOL, entries.len().min(SYMBOL_POOL.len()));
    let label = options.label();

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let symbol = drawn.get(i).copied().unwrap_or(FALLBACK_SYMBOL);
            let name = format!("{} {} {}", symbol, label, i + 1);
            if !options.include_location {
                return name;
            }
            match tag_location(entry) {
                Some(marker) => format!("{} {}", marker, name),
                None => name,
            }
        })
        .collect()
}
