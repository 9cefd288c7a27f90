//! Genome codec: the DNA text form of investors and influencers.
//!
//! Investor DNA:
//! `{Investor;ID=<hash>;Strategy=<name>;InvW1=<f>;InvW2=<f>;Influencers=[<gene>|<gene>]}`
//!
//! Influencer gene: `{<subclass>,Delta1=<n>,Delta2=<n>,Metric=<m>}`
//!
//! Influencers are sorted by metric before serialization so that the identity
//! hash does not depend on construction order.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use super::course_of_action::Strategy;
use super::error::SimError;
use super::subclass::is_known_subclass;

pub const KEY_DELTA1: &str = "Delta1";
pub const KEY_DELTA2: &str = "Delta2";
pub const KEY_METRIC: &str = "Metric";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// An opportunistically typed DNA value.
#[derive(Debug, Clone, PartialEq)]
pub enum DnaValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl DnaValue {
    /// Integer, else float, else string with surrounding quotes removed.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return DnaValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return DnaValue::Float(f);
        }
        DnaValue::Str(raw.trim_matches(|c| c == '"' || c == '\'').to_string())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            DnaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            DnaValue::Int(i) => Some(*i as f64),
            DnaValue::Float(f) => Some(*f),
            DnaValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DnaValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DnaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnaValue::Int(i) => write!(f, "{i}"),
            DnaValue::Float(x) => write!(f, "{x}"),
            DnaValue::Str(s) => f.write_str(s),
        }
    }
}

pub type DnaMap = BTreeMap<String, DnaValue>;

fn split_key_value<'a>(dna: &str, token: &'a str) -> Result<(&'a str, &'a str), SimError> {
    let (k, v) = token
        .split_once('=')
        .ok_or_else(|| SimError::malformed(dna, format!("expected key=value, found {token:?}")))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(SimError::malformed(dna, format!("empty key in {token:?}")));
    }
    Ok((k, v.trim()))
}

fn strip_braces(dna: &str) -> Result<&str, SimError> {
    let t = dna.trim();
    t.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| SimError::malformed(dna, "missing braces"))
}

/// One decoded influencer gene. Deltas may be absent and drawn later.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluencerDna {
    pub subclass: String,
    pub params: DnaMap,
}

impl InfluencerDna {
    pub fn new(subclass: &str, metric: &str) -> Self {
        let mut params = DnaMap::new();
        params.insert(KEY_METRIC.to_string(), DnaValue::Str(metric.to_string()));
        InfluencerDna {
            subclass: subclass.to_string(),
            params,
        }
    }

    pub fn with_deltas(mut self, delta1: i64, delta2: i64) -> Self {
        self.params.insert(KEY_DELTA1.to_string(), DnaValue::Int(delta1));
        self.params.insert(KEY_DELTA2.to_string(), DnaValue::Int(delta2));
        self
    }

    pub fn parse(dna: &str) -> Result<Self, SimError> {
        let inner = strip_braces(dna)?;
        let mut tokens = inner.split(',').map(str::trim);
        let subclass = match tokens.next() {
            Some(t) if !t.is_empty() && !t.contains('=') => t.to_string(),
            _ => return Err(SimError::malformed(dna, "missing influencer subclass")),
        };
        if !is_known_subclass(&subclass) {
            return Err(SimError::UnknownSubclass(subclass));
        }

        let mut params = DnaMap::new();
        for token in tokens {
            let (k, v) = split_key_value(dna, token)?;
            params.insert(k.to_string(), DnaValue::parse(v));
        }

        match params.get(KEY_METRIC) {
            Some(DnaValue::Str(m)) if !m.is_empty() => {}
            _ => return Err(SimError::malformed(dna, "missing Metric")),
        }
        for key in [KEY_DELTA1, KEY_DELTA2] {
            if let Some(v) = params.get(key) {
                if v.as_int().is_none() {
                    return Err(SimError::malformed(dna, format!("{key} must be an integer")));
                }
            }
        }

        Ok(InfluencerDna { subclass, params })
    }

    pub fn metric(&self) -> &str {
        self.params
            .get(KEY_METRIC)
            .and_then(DnaValue::as_str)
            .unwrap_or_default()
    }

    pub fn delta1(&self) -> Option<i64> {
        self.params.get(KEY_DELTA1).and_then(DnaValue::as_int)
    }

    pub fn delta2(&self) -> Option<i64> {
        self.params.get(KEY_DELTA2).and_then(DnaValue::as_int)
    }
}

impl fmt::Display for InfluencerDna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.subclass)?;
        for (k, v) in &self.params {
            write!(f, ",{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// A decoded investor genome.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestorDna {
    pub strategy: Strategy,
    pub inv_w1: f64,
    pub inv_w2: f64,
    pub influencers: Vec<InfluencerDna>,
}

impl InvestorDna {
    /// Decodes investor DNA. Any supplied `ID` is ignored.
    pub fn parse(dna: &str) -> Result<Self, SimError> {
        let inner = strip_braces(dna)?;
        let mut strategy = None;
        let mut w1 = None;
        let mut w2 = None;
        let mut influencers = None;

        for (idx, token) in inner.split(';').map(str::trim).enumerate() {
            if idx == 0 && !token.contains('=') {
                if token != "Investor" {
                    return Err(SimError::malformed(dna, format!("unexpected tag {token:?}")));
                }
                continue;
            }
            let (k, v) = split_key_value(dna, token)?;
            match k {
                "ID" => {}
                "Strategy" => strategy = Some(v.parse::<Strategy>()?),
                "InvW1" => w1 = Some(parse_weight(dna, k, v)?),
                "InvW2" => w2 = Some(parse_weight(dna, k, v)?),
                "Influencers" => influencers = Some(parse_influencer_list(dna, v)?),
                other => {
                    return Err(SimError::malformed(dna, format!("unknown field {other:?}")));
                }
            }
        }

        let strategy = strategy.ok_or_else(|| SimError::malformed(dna, "missing Strategy"))?;
        let inv_w1 = w1.ok_or_else(|| SimError::malformed(dna, "missing InvW1"))?;
        let inv_w2 = w2.ok_or_else(|| SimError::malformed(dna, "missing InvW2"))?;
        let influencers =
            influencers.ok_or_else(|| SimError::malformed(dna, "missing Influencers"))?;
        if inv_w1 + inv_w2 > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(SimError::malformed(dna, "InvW1 + InvW2 exceeds 1"));
        }

        Ok(InvestorDna {
            strategy,
            inv_w1,
            inv_w2,
            influencers,
        })
    }

    /// Influencer genes sorted by metric, ties broken by the full gene text.
    pub fn sorted_influencers(&self) -> Vec<String> {
        let mut genes: Vec<(&str, String)> = self
            .influencers
            .iter()
            .map(|g| (g.metric(), g.to_string()))
            .collect();
        genes.sort();
        genes.into_iter().map(|(_, s)| s).collect()
    }

    fn body(&self) -> String {
        format!(
            "Strategy={};InvW1={:.4};InvW2={:.4};Influencers=[{}]",
            self.strategy,
            self.inv_w1,
            self.inv_w2,
            self.sorted_influencers().join("|")
        )
    }

    /// Canonical DNA without the `ID` field; the identity hash input.
    pub fn canonical(&self) -> String {
        format!("{{Investor;{}}}", self.body())
    }

    pub fn identity(&self) -> String {
        identity_hash(&self.canonical())
    }

    /// Full DNA text including the identity hash.
    pub fn encode(&self) -> String {
        format!("{{Investor;ID={};{}}}", self.identity(), self.body())
    }
}

impl fmt::Display for InvestorDna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn parse_weight(dna: &str, key: &str, raw: &str) -> Result<f64, SimError> {
    let w = DnaValue::parse(raw)
        .as_float()
        .ok_or_else(|| SimError::malformed(dna, format!("{key} is not a number")))?;
    if !(0.0..=1.0).contains(&w) {
        return Err(SimError::malformed(dna, format!("{key} outside [0, 1]")));
    }
    Ok(w)
}

fn parse_influencer_list(dna: &str, raw: &str) -> Result<Vec<InfluencerDna>, SimError> {
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| SimError::malformed(dna, "Influencers must be enclosed in []"))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner.split('|').map(InfluencerDna::parse).collect()
}

/// Lowercase hex SHA-256 of a canonical DNA string.
pub fn identity_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "{Investor;ID=abc;Strategy=MajorityRules;InvW1=0.6000;InvW2=0.4000;\
        Influencers=[{LSMInfluencer,Delta1=-90,Delta2=-5,Metric=WTIOil}|\
        {LSMInfluencer,Delta1=-120,Delta2=-10,Metric=Unemployment}]}";

    #[test]
    fn values_are_typed_opportunistically() {
        assert_eq!(DnaValue::parse("-30"), DnaValue::Int(-30));
        assert_eq!(DnaValue::parse("0.25"), DnaValue::Float(0.25));
        assert_eq!(DnaValue::parse("\"GDP\""), DnaValue::Str("GDP".into()));
        assert_eq!(DnaValue::parse("GDP"), DnaValue::Str("GDP".into()));
    }

    #[test]
    fn influencer_gene_round_trips() {
        let s = "{LSMInfluencer,Delta1=-30,Delta2=-5,Metric=GDP}";
        let gene = InfluencerDna::parse(s).unwrap();
        assert_eq!(gene.subclass, "LSMInfluencer");
        assert_eq!(gene.metric(), "GDP");
        assert_eq!(gene.delta1(), Some(-30));
        assert_eq!(gene.delta2(), Some(-5));
        assert_eq!(gene.to_string(), s);
    }

    #[test]
    fn influencer_gene_without_deltas() {
        let gene = InfluencerDna::parse("{LSMInfluencer,Metric=GDP}").unwrap();
        assert_eq!(gene.delta1(), None);
        assert_eq!(gene.to_string(), "{LSMInfluencer,Metric=GDP}");
    }

    #[test]
    fn influencer_gene_errors() {
        assert!(matches!(
            InfluencerDna::parse("LSMInfluencer,Metric=GDP"),
            Err(SimError::MalformedDna { .. })
        ));
        assert!(matches!(
            InfluencerDna::parse("{LSMInfluencer,Metric}"),
            Err(SimError::MalformedDna { .. })
        ));
        assert!(matches!(
            InfluencerDna::parse("{FooInfluencer,Metric=GDP}"),
            Err(SimError::UnknownSubclass(_))
        ));
        assert!(matches!(
            InfluencerDna::parse("{LSMInfluencer,Delta1=-3}"),
            Err(SimError::MalformedDna { .. })
        ));
        assert!(matches!(
            InfluencerDna::parse("{LSMInfluencer,Delta1=soon,Metric=GDP}"),
            Err(SimError::MalformedDna { .. })
        ));
    }

    #[test]
    fn investor_decode() {
        let dna = InvestorDna::parse(SAMPLE).unwrap();
        assert_eq!(dna.strategy, Strategy::MajorityRules);
        assert_eq!(dna.inv_w1, 0.6);
        assert_eq!(dna.inv_w2, 0.4);
        assert_eq!(dna.influencers.len(), 2);
        assert_eq!(dna.influencers[1].metric(), "Unemployment");
    }

    #[test]
    fn encode_sorts_influencers_and_recomputes_id() {
        let dna = InvestorDna::parse(SAMPLE).unwrap();
        let encoded = dna.encode();
        assert!(!encoded.contains("ID=abc;"));
        let unemp = encoded.find("Metric=Unemployment").unwrap();
        let oil = encoded.find("Metric=WTIOil").unwrap();
        assert!(unemp < oil);
        assert!(encoded.starts_with(&format!("{{Investor;ID={};", dna.identity())));
    }

    #[test]
    fn identity_is_order_independent() {
        let a = InvestorDna::parse(SAMPLE).unwrap();
        let mut b = a.clone();
        b.influencers.reverse();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn decode_of_encode_is_stable() {
        let a = InvestorDna::parse(SAMPLE).unwrap();
        let b = InvestorDna::parse(&a.encode()).unwrap();
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn identity_is_sha256_hex() {
        let id = identity_hash("");
        assert_eq!(
            id,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn investor_decode_errors() {
        let cases = [
            "Investor;Strategy=MajorityRules;InvW1=0.5;InvW2=0.5;Influencers=[]",
            "{Investor;Strategy=MajorityRules;InvW1=0.5;InvW2=0.5}",
            "{Investor;Strategy=Coinflip;InvW1=0.5;InvW2=0.5;Influencers=[]}",
            "{Investor;Strategy=MajorityRules;InvW1=0.9;InvW2=0.5;Influencers=[]}",
            "{Investor;Strategy=MajorityRules;InvW1;InvW2=0.5;Influencers=[]}",
            "{Investor;Strategy=MajorityRules;InvW1=0.5;InvW2=0.5;Influencers={x}}",
            "{Investor;Strategy=MajorityRules;InvW1=0.5;InvW2=0.5;Influencers=[];Color=red}",
        ];
        for c in cases {
            assert!(
                matches!(InvestorDna::parse(c), Err(SimError::MalformedDna { .. })),
                "expected malformed: {c}"
            );
        }
    }
}
