//! # Upgrade Shop
//!
//! Multipliers bought with either currency:
//!
//! | Currency | Paid from | Repeat purchase | Effect |
//! |----------|-----------|-----------------|--------|
//! | Soft | account balance | rejected (`AlreadyPurchased`) | replaces the target multiplier |
//! | Hard | external wallet | allowed, each one a fresh transaction | replaces the target multiplier |
//!
//! Multipliers never compound: buying a 1.5x upgrade after a 2.0x one leaves
//! the account at 1.5x.

use serde::{Deserialize, Serialize};

use yara_core::prelude::*;

/// Currency an item is priced in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Currency {
    /// In-game balance
    Soft,
    /// External currency settled outside the engine
    Hard,
}

/// Which account multiplier an item replaces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultiplierTarget {
    Balance,
    Mining,
}

/// Shop catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price in the item's currency (smallest units)
    pub price: Balance,
    pub currency: Currency,
    pub multiplier: Multiplier,
    pub target: MultiplierTarget,
}

/// Items for sale when no catalog is configured
pub fn default_catalog() -> Vec<StoreItem> {
    vec![
        StoreItem {
            id: ItemId::new("pickaxe"),
            name: "Pickaxe".into(),
            description: "Mine 1.5x faster".into(),
            price: 10_000 * ONE_YARA,
            currency: Currency::Soft,
            multiplier: Multiplier::from_bps(15_000),
            target: MultiplierTarget::Mining,
        },
        StoreItem {
            id: ItemId::new("drill"),
            name: "Drill".into(),
            description: "Mine 2x faster".into(),
            price: 50_000 * ONE_YARA,
            currency: Currency::Soft,
            multiplier: Multiplier::from_bps(20_000),
            target: MultiplierTarget::Mining,
        },
        StoreItem {
            id: ItemId::new("golden-boost"),
            name: "Golden Boost".into(),
            description: "Double every claim".into(),
            price: 1,
            currency: Currency::Hard,
            multiplier: Multiplier::from_bps(20_000),
            target: MultiplierTarget::Balance,
        },
        StoreItem {
            id: ItemId::new("diamond-boost"),
            name: "Diamond Boost".into(),
            description: "Triple every claim".into(),
            price: 5,
            currency: Currency::Hard,
            multiplier: Multiplier::from_bps(30_000),
            target: MultiplierTarget::Balance,
        },
    ]
}

/// Outcome of a purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub item: ItemId,
    /// Amount debited from the balance (zero for hard-currency items)
    pub charged: Balance,
    pub new_balance: Balance,
    pub balance_multiplier: Multiplier,
    pub mining_multiplier: Multiplier,
}

/// Look up a catalog entry
pub fn find_item<'a>(catalog: &'a [StoreItem], id: &ItemId) -> Result<&'a StoreItem> {
    catalog
        .iter()
        .find(|item| &item.id == id)
        .ok_or_else(|| YaraError::ItemNotFound(id.clone()))
}

fn set_multiplier(account: &mut Account, target: MultiplierTarget, multiplier: Multiplier) {
    match target {
        MultiplierTarget::Balance => account.balance_multiplier = multiplier,
        MultiplierTarget::Mining => account.mining_multiplier = multiplier,
    }
}

/// Apply a purchase of `item` to `account`
pub fn purchase(account: &mut Account, item: &StoreItem, now: Timestamp) -> Result<PurchaseReceipt> {
    if !item.multiplier.is_valid() {
        return Err(YaraError::InvalidAmount(format!(
            "item {} multiplier {} is below 1.0x",
            item.id, item.multiplier
        )));
    }

    let charged = match item.currency {
        Currency::Soft => {
            if account.balance < item.price {
                return Err(YaraError::InsufficientBalance {
                    required: item.price,
                    available: account.balance,
                });
            }
            if account.has_purchased(&item.id) {
                return Err(YaraError::AlreadyPurchased(item.id.clone()));
            }
            account.debit(item.price);
            account.purchased_upgrades.insert(item.id.clone());
            item.price
        }
        Currency::Hard => {
            account.premium_purchases.push(PremiumPurchase {
                item: item.id.clone(),
                purchased_at: now,
            });
            0
        }
    };
    set_multiplier(account, item.target, item.multiplier);

    Ok(PurchaseReceipt {
        item: item.id.clone(),
        charged,
        new_balance: account.balance,
        balance_multiplier: account.balance_multiplier,
        mining_multiplier: account.mining_multiplier,
    })
}
