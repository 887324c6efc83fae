//! Credit package catalog.
//!
//! Packages are a fixed catalog compiled into the binary. Purchase
//! settlement verifies payment metadata against this catalog, so the
//! catalog is the authority on what a package is worth.

use serde::Serialize;

/// Settlement currency for all packages, lowercase ISO 4217.
pub const CURRENCY: &str = "usd";

/// A purchasable credit package.
#[derive(Debug, Clone, Serialize)]
pub struct CreditPackage {
    /// Stable package identifier ("starter", "pro", "enterprise").
    pub id: &'static str,

    /// Display name.
    pub name: &'static str,

    /// Credits granted on purchase.
    pub credits: i64,

    /// Net price in minor currency units, before VAT.
    pub price_cents: i64,
}

/// The purchasable package catalog.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter",
        name: "Starter Pack",
        credits: 10_000,
        price_cents: 1_000,
    },
    CreditPackage {
        id: "pro",
        name: "Pro Pack",
        credits: 25_000,
        price_cents: 2_000,
    },
    CreditPackage {
        id: "enterprise",
        name: "Enterprise Pack",
        credits: 100_000,
        price_cents: 5_000,
    },
];

/// Look up a package by its identifier.
#[must_use]
pub fn find_package(package_id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|p| p.id == package_id)
}
