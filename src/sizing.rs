//! Entry sizing - fractional Kelly with hard caps

/// Sizing decision with the raw Kelly fraction kept for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct SizeQuote {
    /// Raw Kelly fraction before the configured fractional multiplier
    pub f_raw: f64,
    /// Fraction actually applied to the bankroll
    pub f_applied: f64,
    /// Final stake, always within [0, balance] and <= max_bet
    pub amount: f64,
}

/// Compute the stake for a candidate entry.
///
/// With a model probability, applies fractional Kelly against the net odds
/// implied by the share price and clamps to [min_bet, max_bet]. A negative
/// raw fraction still stakes `min_bet` - a deliberate probe-position policy,
/// not a Kelly recommendation. Without a probability the base unit `max_bet`
/// is staked.
pub fn entry_size(
    probability: Option<f64>,
    share_price: f64,
    balance: f64,
    kelly_fraction: f64,
    min_bet: f64,
    max_bet: f64,
) -> SizeQuote {
    let price = share_price.clamp(0.01, 0.99);

    let (f_raw, f_applied, desired) = match probability {
        Some(p) => {
            let p = p.clamp(0.0, 1.0);
            let q = 1.0 - p;
            // Net odds: win (1 - price) per unit staked at `price`.
            let b = (1.0 - price) / price;
            let f_raw = p - q / b;
            let f = kelly_fraction.max(0.0) * f_raw;
            if f > 0.0 {
                (f_raw, f, (balance * f).clamp(min_bet, max_bet))
            } else {
                (f_raw, 0.0, min_bet)
            }
        }
        None => (0.0, 0.0, max_bet),
    };

    let amount = desired.min(max_bet).min(balance).max(0.0);

    SizeQuote {
        f_raw,
        f_applied,
        amount,
    }
}
