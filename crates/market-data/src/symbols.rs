/// Name of the series the pipeline predicts.
pub const TARGET_SERIES: &str = "BIST100";

/// Static mapping from human-readable series name to provider ticker.
///
/// Iteration order is insertion order; downstream consumers (lag-correlation
/// sweep, dashboard) rely on that stability.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    entries: Vec<(String, String)>,
}

impl SymbolRegistry {
    /// The tracked universe: the BIST 100 index plus six macro/commodity
    /// indicators.
    pub fn new() -> Self {
        let entries = [
            ("BIST100", "XU100.IS"), // Istanbul Stock Exchange 100 index
            ("Gold", "GC=F"),        // Gold futures
            ("Oil", "CL=F"),         // Crude oil futures
            ("USDTRY", "USDTRY=X"),  // US dollar / Turkish lira
            ("US10Y", "^TNX"),       // US 10-year treasury yield
            ("NatGas", "NG=F"),      // Natural gas futures
            ("VIX", "^VIX"),         // Volatility index
        ];
        Self {
            entries: entries
                .iter()
                .map(|(name, ticker)| (name.to_string(), ticker.to_string()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, ticker)| (name.as_str(), ticker.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn ticker_for(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ticker)| ticker.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_and_lookup() {
        let registry = SymbolRegistry::new();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.names()[0], TARGET_SERIES);
        assert_eq!(registry.ticker_for("Gold"), Some("GC=F"));
        assert_eq!(registry.ticker_for("Copper"), None);

        // Insertion order is stable across calls.
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["BIST100", "Gold", "Oil", "USDTRY", "US10Y", "NatGas", "VIX"]
        );
    }
}
