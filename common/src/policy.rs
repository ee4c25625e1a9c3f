//! Formatting and behaviour policies attached to every value.
//!
//! Policies are immutable and compared by a signature hashed over their
//! enumerated fields, so two independently built policies with the same
//! options are interchangeable.

use crate::decimal::{power_of_ten, quantize, QuantizerFactory, Rounding};
use crate::hash::NodeId;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// How a Percent-unit amount is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PercentDisplay {
    /// Multiply by 100 and suffix with '%'
    #[default]
    Percent,

    /// Show the stored ratio unchanged
    Ratio,
}

/// How the policy for a binary operation is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyResolution {
    /// Use the scoped context policy when one is set
    Context,

    /// Use the left operand's policy
    #[default]
    LeftOperand,

    /// Require identical policy signatures on both operands
    StrictMatch,
}

/// Currency rendering style for the display policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyStyle {
    /// "$1,000.00"
    Symbol,

    /// "1,000.00 USD"
    #[default]
    Code,

    /// Amount only
    Plain,
}

/// Locale-aware display options, consumed only by the `Formatter`
/// collaborator. The arithmetic core never reads these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayPolicy {
    pub locale: String,
    pub currency_code: Option<String>,
    pub min_fraction_digits: Option<u32>,
    pub max_fraction_digits: Option<u32>,
    pub grouping: bool,
    pub currency_style: CurrencyStyle,
    pub negative_in_parentheses: bool,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            currency_code: None,
            min_fraction_digits: None,
            max_fraction_digits: None,
            grouping: true,
            currency_style: CurrencyStyle::Code,
            negative_in_parentheses: false,
        }
    }
}

/// Immutable bundle of rounding, formatting and behaviour options.
///
/// Build with [`Policy::builder`]; handles are shared as `Arc<Policy>`.
#[derive(Clone)]
pub struct Policy {
    decimal_places: u32,
    rounding: Rounding,
    none_text: String,
    thousands_separator: bool,
    negative_in_parentheses: bool,
    percent_display: PercentDisplay,
    arithmetic_strict: bool,
    cap_percentage_at: Option<BigDecimal>,
    quantizer: Arc<dyn QuantizerFactory>,
    display: Option<DisplayPolicy>,
    signature: String,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// The library-wide default policy: 2 decimal places, half-up rounding.
    pub fn default_policy() -> Arc<Policy> {
        static DEFAULT: OnceLock<Arc<Policy>> = OnceLock::new();
        DEFAULT.get_or_init(|| PolicyBuilder::new().build()).clone()
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    pub fn rounding(&self) -> Rounding {
        self.rounding
    }

    pub fn none_text(&self) -> &str {
        &self.none_text
    }

    pub fn thousands_separator(&self) -> bool {
        self.thousands_separator
    }

    pub fn negative_in_parentheses(&self) -> bool {
        self.negative_in_parentheses
    }

    pub fn percent_display(&self) -> PercentDisplay {
        self.percent_display
    }

    pub fn arithmetic_strict(&self) -> bool {
        self.arithmetic_strict
    }

    pub fn cap_percentage_at(&self) -> Option<&BigDecimal> {
        self.cap_percentage_at.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayPolicy> {
        self.display.as_ref()
    }

    /// Stable hex signature over the enumerated fields.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Quantise an amount per this policy's places, rounding and quantizer.
    pub fn quantize(&self, amount: &BigDecimal) -> BigDecimal {
        quantize(
            amount,
            self.decimal_places,
            self.rounding,
            self.quantizer.as_ref(),
        )
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Policy {}

impl std::hash::Hash for Policy {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("decimal_places", &self.decimal_places)
            .field("rounding", &self.rounding)
            .field("none_text", &self.none_text)
            .field("percent_display", &self.percent_display)
            .field("arithmetic_strict", &self.arithmetic_strict)
            .field("quantizer", &self.quantizer.label())
            .field("signature", &&self.signature[..12])
            .finish()
    }
}

/// Builder for [`Policy`]; the signature is computed once at build time.
pub struct PolicyBuilder {
    decimal_places: u32,
    rounding: Rounding,
    none_text: String,
    thousands_separator: bool,
    negative_in_parentheses: bool,
    percent_display: PercentDisplay,
    arithmetic_strict: bool,
    cap_percentage_at: Option<BigDecimal>,
    quantizer: Arc<dyn QuantizerFactory>,
    display: Option<DisplayPolicy>,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self {
            decimal_places: 2,
            rounding: Rounding::HalfUp,
            none_text: "-".to_string(),
            thousands_separator: false,
            negative_in_parentheses: false,
            percent_display: PercentDisplay::Percent,
            arithmetic_strict: false,
            cap_percentage_at: None,
            quantizer: power_of_ten(),
            display: None,
        }
    }

    pub fn decimal_places(mut self, places: u32) -> Self {
        self.decimal_places = places;
        self
    }

    pub fn rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn none_text(mut self, text: impl Into<String>) -> Self {
        self.none_text = text.into();
        self
    }

    pub fn thousands_separator(mut self, on: bool) -> Self {
        self.thousands_separator = on;
        self
    }

    pub fn negative_in_parentheses(mut self, on: bool) -> Self {
        self.negative_in_parentheses = on;
        self
    }

    pub fn percent_display(mut self, display: PercentDisplay) -> Self {
        self.percent_display = display;
        self
    }

    pub fn arithmetic_strict(mut self, on: bool) -> Self {
        self.arithmetic_strict = on;
        self
    }

    pub fn cap_percentage_at(mut self, cap: BigDecimal) -> Self {
        self.cap_percentage_at = Some(cap);
        self
    }

    pub fn quantizer(mut self, quantizer: Arc<dyn QuantizerFactory>) -> Self {
        self.quantizer = quantizer;
        self
    }

    pub fn display(mut self, display: DisplayPolicy) -> Self {
        self.display = Some(display);
        self
    }

    pub fn build(self) -> Arc<Policy> {
        let signature = signature_of(&self);
        Arc::new(Policy {
            decimal_places: self.decimal_places,
            rounding: self.rounding,
            none_text: self.none_text,
            thousands_separator: self.thousands_separator,
            negative_in_parentheses: self.negative_in_parentheses,
            percent_display: self.percent_display,
            arithmetic_strict: self.arithmetic_strict,
            cap_percentage_at: self.cap_percentage_at,
            quantizer: self.quantizer,
            display: self.display,
            signature,
        })
    }
}

fn signature_of(builder: &PolicyBuilder) -> String {
    let mut fields: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    fields.insert("decimal_places", builder.decimal_places.into());
    fields.insert(
        "rounding",
        serde_json::to_value(builder.rounding).unwrap_or_default(),
    );
    fields.insert("none_text", builder.none_text.clone().into());
    fields.insert("thousands_separator", builder.thousands_separator.into());
    fields.insert(
        "negative_in_parentheses",
        builder.negative_in_parentheses.into(),
    );
    fields.insert(
        "percent_display",
        serde_json::to_value(builder.percent_display).unwrap_or_default(),
    );
    fields.insert("arithmetic_strict", builder.arithmetic_strict.into());
    fields.insert(
        "cap_percentage_at",
        builder
            .cap_percentage_at
            .as_ref()
            .map(|c| c.normalized().to_string())
            .into(),
    );
    fields.insert("quantizer", builder.quantizer.label().into());
    fields.insert(
        "display",
        serde_json::to_value(&builder.display).unwrap_or_default(),
    );
    // BTreeMap keys serialise in sorted order, so the preimage is canonical
    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    NodeId::digest(canonical.as_bytes()).to_string()
}
