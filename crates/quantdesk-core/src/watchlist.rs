//! Ordered set of ticker symbols shown in the sidebar.

/// Symbols are stored uppercase and never repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    symbols: Vec<String>,
}

impl Watchlist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for symbol in symbols {
            list.add(symbol.as_ref());
        }
        list
    }

    fn normalize(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    /// Append `symbol` unless it is blank or already present. Returns whether
    /// the list changed.
    pub fn add(&mut self, symbol: &str) -> bool {
        let symbol = Self::normalize(symbol);
        if symbol.is_empty() || self.symbols.contains(&symbol) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    /// Returns whether the list changed.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let symbol = Self::normalize(symbol);
        let before = self.symbols.len();
        self.symbols.retain(|s| *s != symbol);
        self.symbols.len() != before
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(&Self::normalize(symbol))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }

    pub fn position(&self, symbol: &str) -> Option<usize> {
        let symbol = Self::normalize(symbol);
        self.symbols.iter().position(|s| *s == symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_and_dedupes() {
        let list = Watchlist::new(["aapl", " MSFT ", "AAPL", ""]);
        assert_eq!(list.as_slice(), ["AAPL", "MSFT"]);
    }

    #[test]
    fn test_add_appends_once() {
        let mut list = Watchlist::new(["AAPL"]);
        assert!(list.add("pltr"));
        assert!(!list.add("PLTR"));
        assert!(!list.add("   "));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["AAPL", "PLTR"]);
        assert_eq!(list.position("pltr"), Some(1));
    }

    #[test]
    fn test_remove() {
        let mut list = Watchlist::new(["AAPL", "MSFT", "NVDA"]);
        assert!(list.remove("msft"));
        assert!(!list.remove("MSFT"));
        assert_eq!(list.as_slice(), ["AAPL", "NVDA"]);
        assert!(!list.contains("MSFT"));

        assert!(list.remove("AAPL"));
        assert!(list.remove("NVDA"));
        assert!(list.is_empty());
        assert_eq!(list.get(0), None);
    }
}
