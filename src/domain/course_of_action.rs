//! Vote aggregation and decision strategies.

use std::fmt;
use std::str::FromStr;

use super::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Abstain,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
            Action::Abstain => "abstain",
        };
        f.write_str(s)
    }
}

/// How an investor turns influencer votes into one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    DistributedDecision,
    MajorityRules,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::DistributedDecision, Strategy::MajorityRules];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::DistributedDecision => "DistributedDecision",
            Strategy::MajorityRules => "MajorityRules",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.name() == s.trim())
            .ok_or_else(|| SimError::malformed(s, "unknown strategy"))
    }
}

/// One investor's decision for one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseOfAction {
    pub action: Action,
    pub action_pct: f64,
    pub buy_votes: f64,
    pub sell_votes: f64,
    pub hold_votes: f64,
    pub abstains: u32,
    /// The day's decision was a forced stop-loss liquidation.
    pub stop_loss: bool,
}

impl Default for CourseOfAction {
    fn default() -> Self {
        CourseOfAction {
            action: Action::Abstain,
            action_pct: 0.0,
            buy_votes: 0.0,
            sell_votes: 0.0,
            hold_votes: 0.0,
            abstains: 0,
            stop_loss: false,
        }
    }
}

impl CourseOfAction {
    pub fn stop_loss() -> Self {
        CourseOfAction {
            action: Action::Sell,
            action_pct: 1.0,
            stop_loss: true,
            ..Default::default()
        }
    }

    /// Adds one vote. Abstains are counted but carry no weight.
    pub fn tally(&mut self, action: Action, probability: f64, weight: f64) {
        let v = probability * weight;
        match action {
            Action::Buy => self.buy_votes += v,
            Action::Sell => self.sell_votes += v,
            Action::Hold => self.hold_votes += v,
            Action::Abstain => self.abstains += 1,
        }
    }

    pub fn total_votes(&self) -> f64 {
        self.buy_votes + self.sell_votes + self.hold_votes
    }

    /// Resolves the tallied votes into `action` and `action_pct`.
    pub fn resolve(&mut self, strategy: Strategy) {
        let (action, pct) = resolve_votes(
            self.buy_votes,
            self.sell_votes,
            self.hold_votes,
            strategy,
        );
        self.action = action;
        self.action_pct = pct;
    }
}

/// Pure resolution of vote totals. No active votes yields an abstain.
pub fn resolve_votes(buy: f64, sell: f64, hold: f64, strategy: Strategy) -> (Action, f64) {
    let total = buy + sell + hold;
    if total <= 0.0 {
        return (Action::Abstain, 0.0);
    }
    match strategy {
        Strategy::DistributedDecision => {
            if buy == total {
                (Action::Buy, 1.0)
            } else if sell == total {
                (Action::Sell, 1.0)
            } else if hold == total {
                (Action::Hold, 1.0)
            } else if buy > sell {
                (Action::Buy, buy / total)
            } else if sell > buy {
                (Action::Sell, sell / total)
            } else {
                (Action::Hold, hold / total)
            }
        }
        Strategy::MajorityRules => {
            if buy > sell + hold {
                (Action::Buy, 1.0)
            } else if sell > buy + hold {
                (Action::Sell, 1.0)
            } else {
                (Action::Hold, 1.0)
            }
        }
    }
}
