//! `/shop` Command
//!
//! Parsing, execution and tab completion for the player command surface.
//! Every subcommand except `create` and `reload` acts on one of the
//! invoker's own shops, matched by name ignoring case.

use uuid::Uuid;

use crate::config::FormatSettings;
use crate::container::{first_item, count_matching, Holder};
use crate::error::{Result, ShopError};
use crate::location::BlockLocation;
use crate::shop::definition::is_positive_price;
use crate::shop::Shop;
use crate::system::ShopSystem;

const SUBCOMMANDS: [&str; 7] = ["create", "sell", "delete", "list", "info", "toggle", "reload"];

const NOT_OWNED: &str = "Shop not found or you are not the owner!";

#[derive(Debug, Clone, PartialEq)]
pub enum SellSetting {
    Price(f64),
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShopCommand {
    Create {
        name: String,
        amount: u32,
        buy_price: f64,
    },
    Sell {
        name: String,
        setting: SellSetting,
    },
    Delete {
        name: String,
    },
    List,
    Info {
        name: String,
    },
    Toggle {
        name: String,
    },
    Reload,
    Help,
}

// ============================================================================
// Parsing
// ============================================================================

/// Split a chat line into `/shop` arguments. `None` if it is some other
/// command.
pub fn split_command(text: &str) -> Option<Vec<&str>> {
    let mut words = text.trim().trim_start_matches('/').split_whitespace();
    match words.next() {
        Some(root) if root.eq_ignore_ascii_case("shop") => Some(words.collect()),
        _ => None,
    }
}

pub fn parse(args: &[&str]) -> Result<ShopCommand> {
    let Some(sub) = args.first() else {
        return Ok(ShopCommand::Help);
    };

    match sub.to_lowercase().as_str() {
        "create" => {
            if args.len() < 4 {
                return Err(usage("/shop create <name> <amount> <buyPrice>"));
            }
            let amount: i64 = args[2]
                .parse()
                .map_err(|_| ShopError::Validation("Invalid number for amount or price!".into()))?;
            let buy_price: f64 = args[3]
                .parse()
                .map_err(|_| ShopError::Validation("Invalid number for amount or price!".into()))?;
            if amount <= 0 || amount > u32::MAX as i64 {
                return Err(ShopError::InvalidAmount);
            }
            if !is_positive_price(buy_price) {
                return Err(ShopError::InvalidPrice);
            }
            Ok(ShopCommand::Create {
                name: args[1].to_string(),
                amount: amount as u32,
                buy_price,
            })
        }
        "sell" => {
            if args.len() < 3 {
                return Err(usage("/shop sell <name> <sellPrice|off>"));
            }
            let setting = if args[2].eq_ignore_ascii_case("off") {
                SellSetting::Off
            } else {
                let price: f64 = args[2]
                    .parse()
                    .map_err(|_| ShopError::Validation("Invalid number for the sell price!".into()))?;
                if !is_positive_price(price) {
                    return Err(ShopError::InvalidPrice);
                }
                SellSetting::Price(price)
            };
            Ok(ShopCommand::Sell {
                name: args[1].to_string(),
                setting,
            })
        }
        "delete" => named(args, "/shop delete <name>").map(|name| ShopCommand::Delete { name }),
        "info" => named(args, "/shop info <name>").map(|name| ShopCommand::Info { name }),
        "toggle" => named(args, "/shop toggle <name>").map(|name| ShopCommand::Toggle { name }),
        "list" => Ok(ShopCommand::List),
        "reload" => Ok(ShopCommand::Reload),
        _ => Ok(ShopCommand::Help),
    }
}

fn named(args: &[&str], usage_line: &str) -> Result<String> {
    args.get(1)
        .map(|name| name.to_string())
        .ok_or_else(|| usage(usage_line))
}

fn usage(line: &str) -> ShopError {
    ShopError::Validation(format!("Usage: {}", line))
}

// ============================================================================
// Execution
// ============================================================================

/// Run a parsed command for `player`. Returns the lines to show them.
pub async fn execute(
    system: &ShopSystem,
    player: Uuid,
    command: ShopCommand,
    target: Option<BlockLocation>,
) -> Result<Vec<String>> {
    let format = system.format();

    match command {
        ShopCommand::Create { name, amount, buy_price } => {
            let location = target.ok_or_else(|| {
                ShopError::Validation("You must be looking at a chest!".into())
            })?;
            let shop = create(system, player, &name, location, amount, buy_price)?;
            Ok(vec![format!(
                "Shop created! Buy price: {} for {}x {}",
                format.money(shop.buy_price),
                shop.amount,
                shop.item.display_name()
            )])
        }
        ShopCommand::Sell { name, setting } => {
            let mut shop = owned(system, player, &name)?;
            let line = match setting {
                SellSetting::Price(price) => {
                    shop.sell_price = price;
                    shop.sell_enabled = true;
                    format!("Sell price set to {}!", format.money(price))
                }
                SellSetting::Off => {
                    shop.sell_enabled = false;
                    format!("Shop {} no longer buys items", shop.name)
                }
            };
            system.registry().update(&shop)?;
            Ok(vec![line])
        }
        ShopCommand::Delete { name } => {
            let shop = owned(system, player, &name)?;
            if system.registry().delete(&shop.id) {
                Ok(vec!["Shop deleted!".to_string()])
            } else {
                Err(ShopError::NotFound(NOT_OWNED.into()))
            }
        }
        ShopCommand::List => {
            let shops = system.registry().list_by_owner(player);
            if shops.is_empty() {
                return Ok(vec!["You don't own any shops.".to_string()]);
            }
            let mut lines = vec!["Your shops:".to_string()];
            lines.extend(shops.iter().map(|shop| {
                format!(
                    "- [{}] {}: {}x {} for {}",
                    if shop.active { "Active" } else { "Inactive" },
                    shop.name,
                    shop.amount,
                    shop.item.display_name(),
                    format.money(shop.buy_price)
                )
            }));
            Ok(lines)
        }
        ShopCommand::Info { name } => {
            let shop = owned(system, player, &name)?;
            Ok(info_lines(&shop, &format))
        }
        ShopCommand::Toggle { name } => {
            let mut shop = owned(system, player, &name)?;
            shop.active = !shop.active;
            let shop = system.registry().update(&shop)?;
            Ok(vec![format!(
                "Shop {} is now {}!",
                shop.name,
                if shop.active { "active" } else { "inactive" }
            )])
        }
        ShopCommand::Reload => {
            if !system.is_admin(player) {
                return Err(ShopError::Permission(
                    "You don't have permission to use this command!".into(),
                ));
            }
            let loaded = system.reload().await?;
            Ok(vec![format!("Shop configuration reloaded! {} shops loaded.", loaded)])
        }
        ShopCommand::Help => Ok(help_lines(system.is_admin(player))),
    }
}

/// Bind the targeted container to a new shop selling its first item
fn create(
    system: &ShopSystem,
    player: Uuid,
    name: &str,
    location: BlockLocation,
    amount: u32,
    buy_price: f64,
) -> Result<Shop> {
    if system.registry().find_owned(player, name).is_some() {
        return Err(ShopError::Validation(format!("You already own a shop named {}", name)));
    }
    if system.registry().get_at_location(&location).is_some() {
        return Err(ShopError::DuplicateLocation);
    }

    let slots = system
        .containers()
        .read(&Holder::Container(location.clone()))
        .ok_or_else(|| ShopError::Validation("You must be looking at a chest!".into()))?;
    let item = first_item(&slots)
        .map(|stack| stack.item.clone())
        .ok_or_else(|| ShopError::Validation("The chest must contain at least one item!".into()))?;
    if count_matching(&slots, &item) < amount {
        return Err(ShopError::Validation(format!(
            "Not enough items in the chest! Required: {}",
            amount
        )));
    }

    system.registry().create(name, player, location, item, amount, buy_price)
}

fn owned(system: &ShopSystem, player: Uuid, name: &str) -> Result<Shop> {
    system
        .registry()
        .find_owned(player, name)
        .ok_or_else(|| ShopError::NotFound(NOT_OWNED.into()))
}

// ============================================================================
// Text
// ============================================================================

/// Details shown to the owner
pub fn info_lines(shop: &Shop, format: &FormatSettings) -> Vec<String> {
    let mut lines = vec![
        format!("== Shop: {} ==", shop.name),
        format!("Item: {}", shop.item.display_name()),
        format!("Amount per trade: {}", shop.amount),
        format!("Buy price: {}", format.money(shop.buy_price)),
    ];
    if shop.sell_enabled {
        lines.push(format!("Sell price: {}", format.money(shop.sell_price)));
    } else {
        lines.push("Selling: disabled".to_string());
    }
    lines.push(format!("Status: {}", if shop.active { "Active" } else { "Inactive" }));
    lines
}

/// Details shown to a customer inspecting the shop
pub fn buyer_lines(shop: &Shop, owner_name: &str, format: &FormatSettings) -> Vec<String> {
    let mut lines = vec![
        format!("== Shop: {} ==", shop.name),
        format!("Owner: {}", owner_name),
        format!("Item: {}", shop.item.display_name()),
        format!("Amount: {}x", shop.amount),
        format!("Buy price: {}", format.money(shop.buy_price)),
    ];
    if shop.sell_enabled {
        lines.push(format!("Sell price: {}", format.money(shop.sell_price)));
    }
    lines.push("Left click = buy".to_string());
    if shop.sell_enabled {
        lines.push("Right click = sell".to_string());
    }
    lines
}

pub fn help_lines(is_admin: bool) -> Vec<String> {
    let mut lines = vec![
        "== Shop Commands ==".to_string(),
        "/shop create <name> <amount> <buyPrice> - create a shop".to_string(),
        "/shop sell <name> <sellPrice|off> - set or disable the sell price".to_string(),
        "/shop delete <name> - delete a shop".to_string(),
        "/shop list - list your shops".to_string(),
        "/shop info <name> - show shop details".to_string(),
        "/shop toggle <name> - open or close a shop".to_string(),
    ];
    if is_admin {
        lines.push("/shop reload - reload configuration and shops".to_string());
    }
    lines.push("Look at a chest when creating a shop. Left click buys, right click sells.".to_string());
    lines
}

// ============================================================================
// Tab Completion
// ============================================================================

/// Suggestions for the argument being typed (the last one in `args`)
pub fn complete(args: &[&str], owned_names: &[String], is_admin: bool) -> Vec<String> {
    let sub = args.first().map(|s| s.to_lowercase()).unwrap_or_default();

    match args.len() {
        0 | 1 => SUBCOMMANDS
            .iter()
            .filter(|candidate| candidate.starts_with(&sub))
            .filter(|candidate| is_admin || **candidate != "reload")
            .map(|candidate| candidate.to_string())
            .collect(),
        2 => match sub.as_str() {
            "delete" | "info" | "toggle" | "sell" => {
                let input = args[1].to_lowercase();
                owned_names
                    .iter()
                    .filter(|name| name.to_lowercase().starts_with(&input))
                    .cloned()
                    .collect()
            }
            "create" => vec!["<name>".to_string()],
            _ => Vec::new(),
        },
        3 => match sub.as_str() {
            "create" => strings(&["1", "16", "32", "64"]),
            "sell" => strings(&["5", "10", "25", "50", "off"]),
            _ => Vec::new(),
        },
        4 if sub == "create" => strings(&["10", "50", "100", "500"]),
        _ => Vec::new(),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
