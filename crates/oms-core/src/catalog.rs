//! Product catalog used to price new orders.

use oms_config::CatalogConfig;
use oms_types::Product;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Products that can be ordered, keyed by product id.
///
/// Prices may change at runtime; orders keep the snapshot taken at creation.
#[derive(Debug, Default)]
pub struct Catalog {
	products: RwLock<HashMap<String, Product>>,
}

impl Catalog {
	pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
		Self {
			products: RwLock::new(
				products
					.into_iter()
					.map(|product| (product.id.clone(), product))
					.collect(),
			),
		}
	}

	pub fn from_config(config: &CatalogConfig) -> Self {
		Self::new(config.products())
	}

	fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Product>> {
		self.products.read().unwrap_or_else(|e| e.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Product>> {
		self.products.write().unwrap_or_else(|e| e.into_inner())
	}

	/// Current snapshot of a product.
	pub fn resolve(&self, product_id: &str) -> Option<Product> {
		self.read().get(product_id).cloned()
	}

	/// Changes the price of a product. Returns false for unknown products.
	pub fn set_price(&self, product_id: &str, price: Decimal) -> bool {
		match self.write().get_mut(product_id) {
			Some(product) => {
				product.price = price;
				true
			},
			None => false,
		}
	}
}
