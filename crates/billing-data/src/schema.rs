//! Header resolution for usage exports.
//!
//! Exports from different sources name their columns differently
//! (`Date` vs `usage_date`, `Net_Amount` vs `applied_cost_per_quantity`).
//! [`Schema::resolve`] maps whatever header row it is given onto the fixed
//! set of [`CanonicalField`]s using case-insensitive substring tokens.

use std::fmt;

/// The semantic columns the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Date,
    Product,
    Sku,
    Quantity,
    Cost,
    Organization,
    Repository,
    CostCenter,
}

impl CanonicalField {
    /// Resolution order. A header claimed by an earlier field is not offered
    /// to later ones, so `cost_center_name` never resolves as the cost column
    /// and `applied_cost_per_quantity` never resolves as the quantity column
    /// once the cost column has taken it.
    const RESOLUTION_ORDER: [CanonicalField; 8] = [
        CanonicalField::Date,
        CanonicalField::Product,
        CanonicalField::Sku,
        CanonicalField::CostCenter,
        CanonicalField::Cost,
        CanonicalField::Quantity,
        CanonicalField::Organization,
        CanonicalField::Repository,
    ];

    /// Substring tokens in priority order.
    fn tokens(self) -> &'static [&'static str] {
        match self {
            CanonicalField::Date => &["date"],
            CanonicalField::Product => &["product", "service"],
            CanonicalField::Sku => &["sku"],
            CanonicalField::Quantity => &["quantity", "units"],
            CanonicalField::Cost => &["net_amount", "netamount", "net amount", "cost", "amount"],
            CanonicalField::Organization => &["organization"],
            CanonicalField::Repository => &["repository"],
            CanonicalField::CostCenter => &["cost_center", "costcenter", "cost center"],
        }
    }

    fn slot(self) -> usize {
        match self {
            CanonicalField::Date => 0,
            CanonicalField::Product => 1,
            CanonicalField::Sku => 2,
            CanonicalField::Quantity => 3,
            CanonicalField::Cost => 4,
            CanonicalField::Organization => 5,
            CanonicalField::Repository => 6,
            CanonicalField::CostCenter => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Product => "product",
            CanonicalField::Sku => "sku",
            CanonicalField::Quantity => "quantity",
            CanonicalField::Cost => "cost",
            CanonicalField::Organization => "organization",
            CanonicalField::Repository => "repository",
            CanonicalField::CostCenter => "cost_center",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column indices for each canonical field plus the header width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    indices: [Option<usize>; 8],
    width: usize,
}

impl Schema {
    /// Resolve a header row. Never fails: unmatched fields are simply absent.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let lowered: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().trim().to_lowercase())
            .collect();
        let mut claimed = vec![false; lowered.len()];
        let mut indices = [None; 8];

        for field in CanonicalField::RESOLUTION_ORDER {
            let found = field.tokens().iter().find_map(|token| {
                lowered
                    .iter()
                    .enumerate()
                    .find(|(idx, header)| !claimed[*idx] && header.contains(token))
                    .map(|(idx, _)| idx)
            });
            if let Some(idx) = found {
                claimed[idx] = true;
                indices[field.slot()] = Some(idx);
            }
        }

        Self {
            indices,
            width: headers.len(),
        }
    }

    /// Column index of `field`, or `None` when no header matched.
    pub fn index(&self, field: CanonicalField) -> Option<usize> {
        self.indices[field.slot()]
    }

    /// Number of header columns; shorter rows are rejected by the parser.
    pub fn width(&self) -> usize {
        self.width
    }

    /// `true` when date, product and SKU columns were all found. Without them
    /// every data row is rejected.
    pub fn has_required_fields(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    pub fn missing_required_fields(&self) -> Vec<CanonicalField> {
        [
            CanonicalField::Date,
            CanonicalField::Product,
            CanonicalField::Sku,
        ]
        .into_iter()
        .filter(|field| self.index(*field).is_none())
        .collect()
    }
}
