//! Decoded transaction events delivered to subscribers
//!
//! A `TransactionEvent` is assembled once per matched transaction and is
//! never mutated afterwards. Formatting helpers render the notification
//! text used by the watcher binary and by downstream bots.

use alloy_primitives::{Address, B256};
use chrono::DateTime;
use rust_decimal::Decimal;
use std::fmt;

/// Market data for a token contract at lookup time.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    /// USD price; `None` when no market quotes the token
    pub price: Option<Decimal>,
    pub volume24h: Decimal,
    pub liquidity: Decimal,
    /// Percent change over 24h
    pub price_change_24h: Decimal,
}

impl TokenInfo {
    /// Placeholder for a token the market-data lookup knows nothing about.
    pub fn unknown(address: Address) -> Self {
        Self {
            address,
            symbol: "UNKNOWN".to_string(),
            price: None,
            volume24h: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
        }
    }
}

/// Direction of a transfer relative to the transaction sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Buy,
    Sell,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One ERC20 transfer leg found in a transaction's logs.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTransfer {
    pub token: TokenInfo,
    pub from_address: Address,
    pub to_address: Address,
    /// Amount after decimals normalization
    pub amount: Decimal,
    pub operation: Operation,
}

impl TokenTransfer {
    /// USD value of the transfer, when the token has a price.
    ///
    /// `None` also when the product does not fit a `Decimal`.
    pub fn total_value(&self) -> Option<Decimal> {
        self.token.price.and_then(|price| self.amount.checked_mul(price))
    }

    /// Amount with precision scaled to its magnitude.
    pub fn format_amount(&self) -> String {
        if self.amount >= Decimal::from(1_000_000) {
            group_thousands(&format!("{:.0}", self.amount))
        } else if self.amount >= Decimal::ONE {
            group_thousands(&format!("{:.2}", self.amount))
        } else {
            format!("{:.8}", self.amount)
        }
    }

    fn operation_marker(&self) -> &'static str {
        match self.operation {
            Operation::Sell => "🔴",
            Operation::Buy => "🟢",
        }
    }
}

/// A fully decoded transaction touching a watched wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub hash: B256,
    pub block_number: u64,
    /// Block timestamp, unix seconds
    pub timestamp: u64,
    pub from_address: Address,
    pub to_address: Option<Address>,
    /// Native currency transferred, display units
    pub native_value: Decimal,
    pub gas_used: u64,
    /// Effective gas price in gwei
    pub gas_price: Decimal,
    /// Fee paid, native display units
    pub gas_cost: Decimal,
    pub status: TxStatus,
    /// Transfers in log order, at most one per token
    pub transfers: Vec<TokenTransfer>,
}

impl TransactionEvent {
    /// Whether `wallet` is the sender or the recipient of the transaction.
    pub fn involves(&self, wallet: Address) -> bool {
        self.from_address == wallet || self.to_address == Some(wallet)
    }

    fn time_label(&self) -> String {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }

    fn to_label(&self) -> String {
        self.to_address
            .map(|to| format!("0x{:x}", to))
            .unwrap_or_else(|| "contract creation".to_string())
    }

    /// Full multi-line notification.
    pub fn format_full(&self) -> String {
        let mut output = vec![
            "═══════════════════════════════════════════════".to_string(),
            "New Transaction:".to_string(),
            "═══════════════════════════════════════════════".to_string(),
            format!("Time: {}", self.time_label()),
            format!("Hash: {}", self.hash),
            format!("Block: {}", self.block_number),
            format!("Status: {}", self.status),
            String::new(),
            format!("From: 0x{:x}", self.from_address),
            format!("To: {}", self.to_label()),
            format!("Value: {} ETH", self.native_value),
            format!(
                "Gas: {} used @ {} Gwei = {} ETH",
                self.gas_used, self.gas_price, self.gas_cost
            ),
        ];

        if !self.transfers.is_empty() {
            output.push(String::new());
            output.push("Token Information:".to_string());
            output.push("══════════════════════".to_string());

            for transfer in &self.transfers {
                let token = &transfer.token;
                let price = token
                    .price
                    .map(|p| format!("${:.4}", p))
                    .unwrap_or_else(|| "No data".to_string());
                let total = transfer
                    .total_value()
                    .map(|v| format!("${:.2}", v))
                    .unwrap_or_else(|| "No data".to_string());

                output.push(String::new());
                output.push(format!(
                    "{} Operation: {}",
                    transfer.operation_marker(),
                    transfer.operation
                ));
                output.push(format!("Token: {} (0x{:x})", token.symbol, token.address));
                output.push(format!("└── Price: {}", price));
                output.push(format!("└── Price Change (24h): {}%", token.price_change_24h));
                output.push(format!(
                    "└── Volume (24h): ${}",
                    group_thousands(&format!("{:.2}", token.volume24h))
                ));
                output.push(format!(
                    "└── Liquidity: ${}",
                    group_thousands(&format!("{:.2}", token.liquidity))
                ));
                output.push(format!("└── From: 0x{:x}", transfer.from_address));
                output.push(format!("└── To: 0x{:x}", transfer.to_address));
                output.push(format!("└── Amount: {}", transfer.format_amount()));
                output.push(format!("└── Total Value: {}", total));
            }
        }

        output.join("\n")
    }

    /// Short notification showing only the first transfer.
    pub fn format_brief(&self) -> String {
        let mut result = vec![
            format!("Transaction detected at {}:", self.time_label()),
            format!("Hash: {}", self.hash),
            format!("From: 0x{:x}", self.from_address),
            format!("To: {}", self.to_label()),
            format!("Value: {} ETH", self.native_value),
        ];

        if let Some(transfer) = self.transfers.first() {
            let price = transfer
                .token
                .price
                .map(|p| format!("${:.4}", p))
                .unwrap_or_else(|| "No data".to_string());
            result.push(String::new());
            result.push(format!("Token: {}", transfer.token.symbol));
            result.push(format!("Price: {}", price));
            result.push(format!("Amount: {}", transfer.format_amount()));
            result.push(format!("Operation: {}", transfer.operation));
        }

        result.join("\n")
    }
}

/// Insert thousands separators into the integer part of a formatted number.
fn group_thousands(formatted: &str) -> String {
    let (sign, rest) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};
    use std::str::FromStr;

    fn transfer(amount: &str, price: Option<&str>) -> TokenTransfer {
        let mut token = TokenInfo::unknown(address!("4200000000000000000000000000000000000006"));
        token.symbol = "WETH".to_string();
        token.price = price.map(|p| Decimal::from_str(p).unwrap());
        TokenTransfer {
            token,
            from_address: address!("939d8f09e002eaf17e10acab804164bece5b8e3c"),
            to_address: address!("f4aa85656d9350dae3d8006d8fb45c33415e6b21"),
            amount: Decimal::from_str(amount).unwrap(),
            operation: Operation::Sell,
        }
    }

    fn event(transfers: Vec<TokenTransfer>) -> TransactionEvent {
        TransactionEvent {
            hash: b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            block_number: 100,
            timestamp: 1_700_000_000,
            from_address: address!("939d8f09e002eaf17e10acab804164bece5b8e3c"),
            to_address: Some(address!("f4aa85656d9350dae3d8006d8fb45c33415e6b21")),
            native_value: Decimal::ZERO,
            gas_used: 21000,
            gas_price: Decimal::from(20),
            gas_cost: Decimal::from_str("0.00042").unwrap(),
            status: TxStatus::Success,
            transfers,
        }
    }

    #[test]
    fn test_format_amount_precision() {
        assert_eq!(transfer("2500000.4", None).format_amount(), "2,500,000");
        assert_eq!(transfer("1234.5", None).format_amount(), "1,234.50");
        assert_eq!(transfer("0.5", None).format_amount(), "0.50000000");
    }

    #[test]
    fn test_total_value() {
        let t = transfer("2", Some("1.25"));
        assert_eq!(t.total_value(), Some(Decimal::from_str("2.5").unwrap()));
        assert_eq!(transfer("2", None).total_value(), None);
    }

    #[test]
    fn test_total_value_overflow_renders_no_data() {
        // 2^95 raw units of a zero-decimals token
        let t = transfer("39614081257132168796771975168", Some("2"));
        assert_eq!(t.total_value(), None);

        let text = event(vec![t]).format_full();
        assert!(text.contains("└── Total Value: No data"));
        assert!(text.contains("Token: WETH (0x4200000000000000000000000000000000000006)"));
    }

    #[test]
    fn test_involves_sender_and_recipient() {
        let ev = event(vec![]);
        assert!(ev.involves(address!("939d8f09e002eaf17e10acab804164bece5b8e3c")));
        assert!(ev.involves(address!("f4aa85656d9350dae3d8006d8fb45c33415e6b21")));
        assert!(!ev.involves(address!("0000000000000000000000000000000000000001")));
    }

    #[test]
    fn test_format_brief_uses_first_transfer() {
        let ev = event(vec![transfer("1", Some("3000")), transfer("5", None)]);
        let text = ev.format_brief();
        assert!(text.contains("Token: WETH"));
        assert!(text.contains("Price: $3000.0000"));
        assert!(text.contains("Operation: SELL"));
        assert!(text.contains("From: 0x939d8f09e002eaf17e10acab804164bece5b8e3c"));
    }

    #[test]
    fn test_format_full_without_price() {
        let text = event(vec![transfer("1", None)]).format_full();
        assert!(text.contains("Status: Success"));
        assert!(text.contains("└── Price: No data"));
        assert!(text.contains("└── Total Value: No data"));
        assert!(text.contains("2023-11-14 22:13:20 UTC"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567.89"), "1,234,567.89");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("-1000"), "-1,000");
    }
}
