//! Authoritative unit price and availability resolution.

use common::Money;
use store::{Product, Variant};

/// Unit price of a variant: its sale price when present and lower, else its price.
pub fn variant_unit_price(variant: &Variant) -> Money {
    match variant.sale_price {
        Some(sale) if sale < variant.price => sale,
        _ => variant.price,
    }
}

/// Unit price of a product bought without a variant: base sale price, else base price.
pub fn product_unit_price(product: &Product) -> Money {
    product.base_sale_price.unwrap_or(product.base_price)
}

/// Stock available to a product bought without a variant.
///
/// Summed across variants; nothing is decremented on the base product.
pub fn product_available_stock(variants: &[Variant]) -> u32 {
    variants
        .iter()
        .fold(0u32, |acc, v| acc.saturating_add(v.stock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, VariantId};

    fn variant(price: i64, sale: Option<i64>, stock: u32) -> Variant {
        Variant {
            id: VariantId::new(),
            product_id: ProductId::new(),
            price: Money::from_cents(price),
            sale_price: sale.map(Money::from_cents),
            stock,
            size: None,
            color: None,
            material: None,
        }
    }

    #[test]
    fn sale_price_applies_only_when_lower() {
        assert_eq!(variant_unit_price(&variant(1000, Some(800), 1)).cents(), 800);
        assert_eq!(variant_unit_price(&variant(1000, Some(1200), 1)).cents(), 1000);
        assert_eq!(variant_unit_price(&variant(1000, None, 1)).cents(), 1000);
    }

    #[test]
    fn product_price_prefers_base_sale_price() {
        let mut product = Product {
            id: ProductId::new(),
            name: "Tote".to_string(),
            base_price: Money::from_cents(2500),
            base_sale_price: Some(Money::from_cents(2000)),
        };
        assert_eq!(product_unit_price(&product).cents(), 2000);

        product.base_sale_price = None;
        assert_eq!(product_unit_price(&product).cents(), 2500);
    }

    #[test]
    fn product_stock_sums_variants() {
        let variants = vec![variant(1, None, 2), variant(1, None, 5)];
        assert_eq!(product_available_stock(&variants), 7);
        assert_eq!(product_available_stock(&[]), 0);
    }
}
