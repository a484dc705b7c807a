//! Market-level input data and the product registry.
//!
//! `MarketData` holds one row per market: which products are offered, the
//! estimated revenue differential of each product, and optionally market
//! instruments and product-to-market distances. `ProductRegistry` lists
//! the products that enter the moment inequalities and the firm that owns
//! each of them.

use crate::errors::{validate_all_finite, validate_len, InferenceError, InferenceResult};
use nalgebra::DMatrix;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum number of instrument columns (columns 1, 2 and 3 are used).
pub const MIN_INSTRUMENT_COLUMNS: usize = 4;

/// A product entering the moment inequalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Product {
    /// 0-based column of this product in the portfolio matrix
    pub column: usize,
    /// 0-based owning firm
    pub firm: usize,
}

/// Ordered list of products with their owning firms.
///
/// The registry position of a product determines its column in the
/// revenue and distance matrices (position `p` reads column `p + 1`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProductRegistry {
    products: Vec<Product>,
    num_firms: usize,
}

impl ProductRegistry {
    /// Build a registry from 0-based products.
    ///
    /// Firm ids must cover `0..num_firms` without gaps.
    pub fn new(products: Vec<Product>) -> InferenceResult<Self> {
        if products.is_empty() {
            return Err(InferenceError::EmptySelection {
                context: "product registry".to_string(),
            });
        }

        // gap-free ids cannot exceed the number of products
        if let Some(product) = products.iter().find(|p| p.firm >= products.len()) {
            return Err(InferenceError::InvalidParameter {
                parameter: "firm".to_string(),
                value: product.firm as f64,
                constraint: format!("< number of products ({})", products.len()),
            });
        }
        let num_firms = products.iter().map(|p| p.firm).max().map_or(0, |f| f + 1);
        let mut seen = vec![false; num_firms];
        for product in &products {
            seen[product.firm] = true;
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(InferenceError::InvalidParameter {
                parameter: "firm".to_string(),
                value: missing as f64,
                constraint: format!("every firm in 0..{} must own a product", num_firms),
            });
        }

        Ok(Self {
            products,
            num_firms,
        })
    }

    /// Build a registry from `(column, firm)` pairs numbered from 1, as the
    /// registry is stored on disk.
    pub fn from_one_based(pairs: &[(usize, usize)]) -> InferenceResult<Self> {
        let products = pairs
            .iter()
            .enumerate()
            .map(|(i, &(column, firm))| {
                if column == 0 || firm == 0 {
                    return Err(InferenceError::InvalidParameter {
                        parameter: format!("registry entry {}", i + 1),
                        value: 0.0,
                        constraint: "1-based column and firm numbers".to_string(),
                    });
                }
                Ok(Product {
                    column: column - 1,
                    firm: firm - 1,
                })
            })
            .collect::<InferenceResult<Vec<_>>>()?;
        Self::new(products)
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the registry is empty (never true for a constructed registry).
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Number of distinct firms.
    pub fn num_firms(&self) -> usize {
        self.num_firms
    }

    /// Products in registry order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Registry positions and products owned by `firm`.
    pub fn firm_products(&self, firm: usize) -> impl Iterator<Item = (usize, &Product)> + '_ {
        self.products
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.firm == firm)
    }
}

/// Market-level observations.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    portfolio: DMatrix<f64>,
    revenue: DMatrix<f64>,
    instruments: Option<DMatrix<f64>>,
    distances: Option<DMatrix<f64>>,
}

impl MarketData {
    /// Create market data from the portfolio (n × J, entries 0 or 1) and the
    /// revenue differentials (n × (J + 1), first column unused).
    pub fn new(portfolio: DMatrix<f64>, revenue: DMatrix<f64>) -> InferenceResult<Self> {
        validate_len(
            portfolio.nrows(),
            revenue.nrows(),
            "revenue rows vs portfolio rows",
        )?;
        if portfolio.nrows() == 0 {
            return Err(InferenceError::EmptySelection {
                context: "market data has no markets".to_string(),
            });
        }
        validate_all_finite(revenue.iter(), "revenue")?;
        if let Some((position, &value)) = portfolio
            .iter()
            .enumerate()
            .find(|&(_, &v)| v != 0.0 && v != 1.0)
        {
            return Err(InferenceError::InvalidParameter {
                parameter: format!(
                    "portfolio[({}, {})]",
                    position % portfolio.nrows(),
                    position / portfolio.nrows()
                ),
                value,
                constraint: "0 or 1".to_string(),
            });
        }

        Ok(Self {
            portfolio,
            revenue,
            instruments: None,
            distances: None,
        })
    }

    /// Attach the market instruments (n × at least 4).
    pub fn with_instruments(mut self, instruments: DMatrix<f64>) -> InferenceResult<Self> {
        validate_len(
            self.num_markets(),
            instruments.nrows(),
            "instrument rows vs portfolio rows",
        )?;
        if instruments.ncols() < MIN_INSTRUMENT_COLUMNS {
            return Err(InferenceError::ShapeMismatch {
                context: "instrument columns".to_string(),
                expected: MIN_INSTRUMENT_COLUMNS,
                actual: instruments.ncols(),
            });
        }
        validate_all_finite(instruments.iter(), "instruments")?;
        self.instruments = Some(instruments);
        Ok(self)
    }

    /// Attach product-to-market distances (n × (J + 1), first column unused).
    pub fn with_distances(mut self, distances: DMatrix<f64>) -> InferenceResult<Self> {
        validate_len(
            self.num_markets(),
            distances.nrows(),
            "distance rows vs portfolio rows",
        )?;
        validate_all_finite(distances.iter(), "distances")?;
        self.distances = Some(distances);
        Ok(self)
    }

    /// Number of markets `n`.
    pub fn num_markets(&self) -> usize {
        self.portfolio.nrows()
    }

    /// Portfolio matrix.
    pub fn portfolio(&self) -> &DMatrix<f64> {
        &self.portfolio
    }

    /// Revenue differentials.
    pub fn revenue(&self) -> &DMatrix<f64> {
        &self.revenue
    }

    /// Market instruments, if supplied.
    pub fn instruments(&self) -> Option<&DMatrix<f64>> {
        self.instruments.as_ref()
    }

    /// Product-to-market distances, if supplied.
    pub fn distances(&self) -> Option<&DMatrix<f64>> {
        self.distances.as_ref()
    }

    /// Check that every registry product can be read from these matrices.
    pub fn check_registry(&self, registry: &ProductRegistry) -> InferenceResult<()> {
        if let Some(product) = registry
            .products()
            .iter()
            .find(|p| p.column >= self.portfolio.ncols())
        {
            return Err(InferenceError::ShapeMismatch {
                context: format!("portfolio columns for product column {}", product.column),
                expected: product.column + 1,
                actual: self.portfolio.ncols(),
            });
        }
        if self.revenue.ncols() < registry.len() + 1 {
            return Err(InferenceError::ShapeMismatch {
                context: "revenue columns vs registry length + 1".to_string(),
                expected: registry.len() + 1,
                actual: self.revenue.ncols(),
            });
        }
        if let Some(distances) = &self.distances {
            if distances.ncols() < registry.len() + 1 {
                return Err(InferenceError::ShapeMismatch {
                    context: "distance columns vs registry length + 1".to_string(),
                    expected: registry.len() + 1,
                    actual: distances.ncols(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_firm_registry() -> ProductRegistry {
        ProductRegistry::from_one_based(&[(1, 1), (2, 1), (3, 2)]).unwrap()
    }

    #[test]
    fn test_registry_from_one_based() {
        let registry = two_firm_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.num_firms(), 2);
        assert_eq!(registry.products()[2], Product { column: 2, firm: 1 });

        let firm0: Vec<usize> = registry.firm_products(0).map(|(p, _)| p).collect();
        assert_eq!(firm0, vec![0, 1]);
    }

    #[test]
    fn test_registry_rejects_gaps_and_zero() {
        // Test Case: firm 0 owns nothing
        let products = vec![Product { column: 0, firm: 1 }];
        assert!(matches!(
            ProductRegistry::new(products),
            Err(InferenceError::InvalidParameter { .. })
        ));

        assert!(ProductRegistry::from_one_based(&[(0, 1)]).is_err());
        assert!(matches!(
            ProductRegistry::new(vec![]),
            Err(InferenceError::EmptySelection { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_out_of_range_firm_ids() {
        let products = vec![Product {
            column: 0,
            firm: usize::MAX,
        }];
        match ProductRegistry::new(products) {
            Err(InferenceError::InvalidParameter { parameter, .. }) => {
                assert_eq!(parameter, "firm");
            }
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }

        let products = vec![
            Product { column: 0, firm: 0 },
            Product { column: 1, firm: 2 },
        ];
        assert!(ProductRegistry::new(products).is_err());
    }

    #[test]
    fn test_market_data_shape_checks() {
        let portfolio = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let revenue = DMatrix::from_element(3, 4, 1.0);
        match MarketData::new(portfolio.clone(), revenue) {
            Err(InferenceError::ShapeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }

        let revenue = DMatrix::from_element(2, 4, 1.0);
        let data = MarketData::new(portfolio, revenue).unwrap();
        assert_eq!(data.num_markets(), 2);
        assert!(data.check_registry(&two_firm_registry()).is_ok());

        let short = ProductRegistry::from_one_based(&[(1, 1), (2, 1), (3, 2), (4, 2)]).unwrap();
        assert!(matches!(
            data.check_registry(&short),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_market_data_value_checks() {
        let portfolio = DMatrix::from_row_slice(1, 2, &[1.0, 0.5]);
        let revenue = DMatrix::from_element(1, 3, 1.0);
        assert!(matches!(
            MarketData::new(portfolio, revenue),
            Err(InferenceError::InvalidParameter { .. })
        ));

        let portfolio = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        let revenue = DMatrix::from_row_slice(1, 3, &[0.0, f64::NAN, 1.0]);
        assert!(matches!(
            MarketData::new(portfolio, revenue),
            Err(InferenceError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_optional_matrices() {
        let portfolio = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
        let revenue = DMatrix::from_element(2, 2, 1.0);
        let data = MarketData::new(portfolio, revenue).unwrap();

        assert!(matches!(
            data.clone().with_instruments(DMatrix::zeros(2, 3)),
            Err(InferenceError::ShapeMismatch { .. })
        ));
        let data = data
            .with_instruments(DMatrix::zeros(2, 4))
            .unwrap()
            .with_distances(DMatrix::from_element(2, 2, 3.0))
            .unwrap();
        assert!(data.instruments().is_some());
        assert!(data.distances().is_some());
    }
}
