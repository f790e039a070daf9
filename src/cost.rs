const MS_PER_MINUTE: u64 = 60_000;

/// Whole minutes billed for a duration, rounded up.
pub fn billable_minutes(duration_ms: u64) -> u64 {
    duration_ms.div_ceil(MS_PER_MINUTE)
}

/// Estimated cost of converting `duration_ms` of audio, rounded to cents.
pub fn estimate_cost(duration_ms: u64, price_per_min: f64) -> f64 {
    round_cents(billable_minutes(duration_ms) as f64 * price_per_min)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converted duration accumulated over one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CostLedger {
    price_per_min: f64,
    total_ms: u64,
    segments: usize,
}

impl CostLedger {
    pub fn new(price_per_min: f64) -> Self {
        Self {
            price_per_min,
            total_ms: 0,
            segments: 0,
        }
    }

    /// Add one converted segment.
    pub fn record(&mut self, duration_ms: u64) {
        self.total_ms += duration_ms;
        self.segments += 1;
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn minutes(&self) -> u64 {
        billable_minutes(self.total_ms)
    }

    pub fn cost(&self) -> f64 {
        estimate_cost(self.total_ms, self.price_per_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billable_minutes_round_up() {
        assert_eq!(billable_minutes(0), 0);
        assert_eq!(billable_minutes(1), 1);
        assert_eq!(billable_minutes(60_000), 1);
        assert_eq!(billable_minutes(60_001), 2);
        assert_eq!(billable_minutes(7 * 60_000), 7);
    }

    #[test]
    fn test_estimate_cost() {
        assert_eq!(estimate_cost(0, 0.30), 0.0);
        assert_eq!(estimate_cost(7 * 60_000, 0.20), 1.4);
        assert_eq!(estimate_cost(90_000, 0.30), 0.6);
        assert_eq!(estimate_cost(60_000, 0.333), 0.33);
    }

    #[test]
    fn test_estimate_cost_is_monotonic() {
        let mut previous = 0.0;
        for ms in (0..20 * 60_000).step_by(7_919) {
            let cost = estimate_cost(ms, 0.30);
            assert!(cost >= previous, "cost dropped at {ms}ms");
            assert_eq!(cost, estimate_cost(ms, 0.30));
            previous = cost;
        }
    }

    #[test]
    fn test_ledger_accumulates() {
        let mut ledger = CostLedger::new(0.30);
        ledger.record(4 * 60_000);
        ledger.record(3 * 60_000);

        assert_eq!(ledger.segments(), 2);
        assert_eq!(ledger.total_ms(), 7 * 60_000);
        assert_eq!(ledger.minutes(), 7);
        assert_eq!(ledger.cost(), 2.1);
    }
}
