//! Static feature and pricing catalog
//!
//! Immutable configuration keyed by stable identifiers: paid features with
//! their token costs, premium subscription plans, and prepaid token packages.
//! Pricing is always resolved server-side from this table, never trusted from
//! a client request.

use serde::Serialize;
use time::Duration;

use crate::types::PremiumPlan;

/// A paid (or free-tier) feature gated by the entitlement check
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub is_premium: bool,
    pub token_cost: i64,
}

/// A premium subscription plan purchasable through the payment gateway
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubscriptionPlan {
    pub key: PremiumPlan,
    pub name: &'static str,
    /// Gross price in minor currency units
    pub price: i64,
    /// Tokens credited as a bonus when the plan settles
    pub bonus_tokens: i64,
    #[serde(skip)]
    pub period: Duration,
    pub description: &'static str,
}

/// A prepaid token package purchasable through the payment gateway
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenPackage {
    pub key: &'static str,
    pub name: &'static str,
    pub amount: i64,
    /// Gross price in minor currency units
    pub price: i64,
}

pub const FEATURES: &[FeatureConfig] = &[
    FeatureConfig {
        id: "career-self-discovery",
        name: "Career Self Discovery",
        category: "career",
        description: "Map strengths and interests into concrete career directions",
        is_premium: true,
        token_cost: 2,
    },
    FeatureConfig {
        id: "swot-self-analysis",
        name: "SWOT Self-Analysis",
        category: "career",
        description: "Personality-based SWOT analysis",
        is_premium: true,
        token_cost: 2,
    },
    FeatureConfig {
        id: "interview-simulation",
        name: "Interview Simulation",
        category: "career",
        description: "Practice interviews with generated feedback",
        is_premium: true,
        token_cost: 3,
    },
    FeatureConfig {
        id: "application-essay",
        name: "Application Essay",
        category: "writing",
        description: "Draft compelling program application essays",
        is_premium: true,
        token_cost: 2,
    },
    FeatureConfig {
        id: "essay-idea-generator",
        name: "Essay Idea Generator",
        category: "writing",
        description: "Generate essay ideas for competitions",
        is_premium: false,
        token_cost: 1,
    },
    FeatureConfig {
        id: "business-plan-generator",
        name: "Business Plan Generator",
        category: "writing",
        description: "Create structured business plans",
        is_premium: false,
        token_cost: 1,
    },
    FeatureConfig {
        id: "profile-bio-analyzer",
        name: "Profile Bio Analyzer",
        category: "branding",
        description: "Analyze and optimize a social profile bio",
        is_premium: true,
        token_cost: 3,
    },
    FeatureConfig {
        id: "headline-optimizer",
        name: "Headline Optimizer",
        category: "branding",
        description: "Optimize a professional headline and summary",
        is_premium: true,
        token_cost: 3,
    },
    FeatureConfig {
        id: "prompt-enhancer",
        name: "Prompt Enhancer",
        category: "daily-tools",
        description: "Rewrite a rough prompt into a structured one",
        is_premium: false,
        token_cost: 1,
    },
];

pub const SUBSCRIPTION_PLANS: &[SubscriptionPlan] = &[
    SubscriptionPlan {
        key: PremiumPlan::Monthly,
        name: "Premium Monthly",
        price: 3_900,
        bonus_tokens: 30,
        period: Duration::days(30),
        description: "All premium features + 30 bonus tokens",
    },
    SubscriptionPlan {
        key: PremiumPlan::Yearly,
        name: "Premium Yearly",
        price: 39_000,
        bonus_tokens: 150,
        period: Duration::days(365),
        description: "All premium features + 150 bonus tokens",
    },
];

pub const TOKEN_PACKAGES: &[TokenPackage] = &[
    TokenPackage {
        key: "small",
        name: "5 Tokens",
        amount: 5,
        price: 750,
    },
    TokenPackage {
        key: "medium",
        name: "10 Tokens",
        amount: 10,
        price: 1_000,
    },
    TokenPackage {
        key: "large",
        name: "50 Tokens",
        amount: 50,
        price: 4_500,
    },
    TokenPackage {
        key: "xlarge",
        name: "100 Tokens",
        amount: 100,
        price: 8_000,
    },
];

/// Look up a feature by its stable id
pub fn feature(feature_id: &str) -> Option<&'static FeatureConfig> {
    FEATURES.iter().find(|f| f.id == feature_id)
}

/// All features in a category
pub fn features_by_category(category: &str) -> Vec<&'static FeatureConfig> {
    FEATURES.iter().filter(|f| f.category == category).collect()
}

/// Look up a subscription plan
pub fn plan(key: PremiumPlan) -> &'static SubscriptionPlan {
    // Both enum variants are present in the table
    #[allow(clippy::unwrap_used)]
    SUBSCRIPTION_PLANS.iter().find(|p| p.key == key).unwrap()
}

/// Look up a token package by key
pub fn package(key: &str) -> Option<&'static TokenPackage> {
    TOKEN_PACKAGES.iter().find(|p| p.key == key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_lookup() {
        let f = feature("interview-simulation").unwrap();
        assert!(f.is_premium);
        assert_eq!(f.token_cost, 3);
        assert!(feature("no-such-feature").is_none());
    }

    #[test]
    fn test_every_plan_resolves() {
        assert_eq!(plan(PremiumPlan::Monthly).bonus_tokens, 30);
        assert_eq!(plan(PremiumPlan::Yearly).period, Duration::days(365));
    }

    #[test]
    fn test_package_lookup() {
        assert_eq!(package("medium").unwrap().amount, 10);
        assert!(package("mega").is_none());
    }

    #[test]
    fn test_catalog_sanity() {
        for f in FEATURES {
            assert!(f.token_cost > 0, "{} has non-positive cost", f.id);
        }
        for p in TOKEN_PACKAGES {
            assert!(p.amount > 0 && p.price > 0);
        }
    }
}
