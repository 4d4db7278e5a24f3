//! Opaque platform identifiers. The numeric ids the storefront sends are
//! wrapped into `gid://` strings here and nowhere else, so the external id
//! scheme can change without touching call sites.

pub fn customer_gid(id: i64) -> String {
    format!("gid://shopify/Customer/{id}")
}

pub fn variant_gid(id: i64) -> String {
    format!("gid://shopify/ProductVariant/{id}")
}

#[cfg(test)]
mod tests {
    use super::{customer_gid, variant_gid};

    #[test]
    fn builds_customer_and_variant_gids() {
        assert_eq!(customer_gid(42), "gid://shopify/Customer/42");
        assert_eq!(variant_gid(99), "gid://shopify/ProductVariant/99");
    }
}
