use indexmap::IndexMap;
use serde::Deserialize;

/// Token grants keyed by billing product identifier
///
/// Each `INITIAL_PURCHASE` or `RENEWAL` for a listed product adds its token
/// count to the user's balance. Replacing the `[products]` table replaces
/// the defaults entirely.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProductsConfig(IndexMap<String, u64>);

impl Default for ProductsConfig {
    fn default() -> Self {
        Self(IndexMap::from([("weekly".to_owned(), 200), ("yearly".to_owned(), 4000)]))
    }
}

impl ProductsConfig {
    /// Tokens granted for a product, `None` when the product is not listed
    pub fn tokens_for(&self, product_id: &str) -> Option<u64> {
        self.0.get(product_id).copied()
    }

    /// Iterate over configured products in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(id, tokens)| (id.as_str(), *tokens))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for ProductsConfig {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, tokens)| (id.into(), tokens)).collect())
    }
}
