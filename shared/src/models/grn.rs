//! Goods receipt note models and line item arithmetic

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// GRN status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrnStatus {
    #[serde(rename = "Awaiting QA")]
    AwaitingQa,
    #[serde(rename = "Sampling Requested")]
    SamplingRequested,
}

impl GrnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrnStatus::AwaitingQa => "Awaiting QA",
            GrnStatus::SamplingRequested => "Sampling Requested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Awaiting QA" => Some(GrnStatus::AwaitingQa),
            "Sampling Requested" => Some(GrnStatus::SamplingRequested),
            _ => None,
        }
    }
}

/// Round a money amount to two decimal places, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Exclusive bound on money amounts, which are stored as NUMERIC(18,2)
pub fn money_limit() -> Decimal {
    Decimal::from(10_000_000_000_000_000_i64)
}

fn in_money_range(value: Decimal) -> Option<Decimal> {
    (value.abs() < money_limit()).then_some(value)
}

/// Net, VAT and gross of one line, or None when an amount overflows or
/// leaves the money range
fn line_amounts(
    quantity: Decimal,
    price: Decimal,
    vat_rate: Decimal,
) -> Option<(Decimal, Decimal, Decimal)> {
    let net = in_money_range(round_money(quantity.checked_mul(price)?))?;
    let vat = round_money(net.checked_mul(vat_rate)?.checked_div(Decimal::from(100))?);
    let vat = in_money_range(vat)?;
    let gross = in_money_range(net.checked_add(vat)?)?;
    Some((net, vat, gross))
}

/// A priced GRN line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnItem {
    pub description: String,
    pub stock_code: Option<String>,
    pub status: Option<String>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub vat_rate: Decimal,
    pub net: Decimal,
    pub vat_amount: Decimal,
    pub gross: Decimal,
    pub nominal: Option<String>,
    pub account: Option<String>,
}

impl GrnItem {
    /// Price a line: net = quantity × price, VAT = net × rate / 100, gross = net + VAT.
    /// None when an amount does not fit the money range.
    pub fn priced(input: GrnItemInput) -> Option<Self> {
        let vat_rate = input.vat_rate.unwrap_or(Decimal::ZERO);
        let (net, vat_amount, gross) = line_amounts(input.quantity, input.price, vat_rate)?;
        Some(Self {
            description: input.description,
            stock_code: input.stock_code,
            status: input.status,
            quantity: input.quantity,
            price: input.price,
            vat_rate,
            net,
            vat_amount,
            gross,
            nominal: input.nominal,
            account: input.account,
        })
    }

    /// Whether the stored amounts agree with quantity, price and rate
    pub fn is_consistent(&self) -> bool {
        line_amounts(self.quantity, self.price, self.vat_rate)
            == Some((self.net, self.vat_amount, self.gross))
    }
}

/// Document totals of a GRN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrnTotals {
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub gross_total: Decimal,
}

impl GrnTotals {
    /// Sum the lines; None when a total leaves the money range
    pub fn from_items(items: &[GrnItem]) -> Option<Self> {
        items.iter().try_fold(
            Self {
                net_total: Decimal::ZERO,
                vat_total: Decimal::ZERO,
                gross_total: Decimal::ZERO,
            },
            |totals, item| {
                Some(Self {
                    net_total: in_money_range(totals.net_total.checked_add(item.net)?)?,
                    vat_total: in_money_range(totals.vat_total.checked_add(item.vat_amount)?)?,
                    gross_total: in_money_range(totals.gross_total.checked_add(item.gross)?)?,
                })
            },
        )
    }
}

/// Stored totals disagree with the line items
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("GRN {grn_code} totals do not match its line items")]
pub struct TotalsMismatch {
    pub grn_code: String,
}

/// The warehouse's formal receipt of a gate entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceiptNote {
    pub id: Uuid,
    pub gate_entry_id: Uuid,
    pub entry_code: String,
    pub grn_code: String,
    pub po_number: String,
    pub delivery_challan: Option<String>,
    pub quantity_received: Decimal,
    pub remarks: Option<String>,
    pub status: GrnStatus,
    pub supplier_name: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_location: Option<String>,
    pub supplier_contact: Option<String>,
    pub document_status: Option<String>,
    pub document_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub period: Option<String>,
    pub reference: Option<String>,
    pub comment: Option<String>,
    pub items: Vec<GrnItem>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub gross_total: Decimal,
    pub qa_notes: Option<String>,
    pub created_by: String,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoodsReceiptNote {
    pub fn totals(&self) -> GrnTotals {
        GrnTotals {
            net_total: self.net_total,
            vat_total: self.vat_total,
            gross_total: self.gross_total,
        }
    }

    /// Recompute totals from the items and compare with the stored ones
    pub fn verify_totals(&self) -> Result<(), TotalsMismatch> {
        let recomputed = GrnTotals::from_items(&self.items);
        let items_ok = self.items.iter().all(GrnItem::is_consistent);
        if items_ok
            && recomputed == Some(self.totals())
            && self.net_total.checked_add(self.vat_total) == Some(self.gross_total)
        {
            Ok(())
        } else {
            Err(TotalsMismatch {
                grn_code: self.grn_code.clone(),
            })
        }
    }
}

/// A GRN before the store has assigned its GRN code
#[derive(Debug, Clone, PartialEq)]
pub struct NewGrn {
    pub id: Uuid,
    pub entry_code: String,
    pub input: CreateGrnInput,
    pub items: Vec<GrnItem>,
    pub totals: GrnTotals,
    pub created_by: String,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewGrn {
    /// Price the input items and compute document totals; None when an
    /// amount does not fit the money range
    pub fn priced(
        id: Uuid,
        entry_code: String,
        input: CreateGrnInput,
        created_by: String,
        created_by_name: String,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        let items = input
            .items
            .iter()
            .cloned()
            .map(GrnItem::priced)
            .collect::<Option<Vec<GrnItem>>>()?;
        let totals = GrnTotals::from_items(&items)?;
        Some(Self {
            id,
            entry_code,
            input,
            items,
            totals,
            created_by,
            created_by_name,
            created_at,
        })
    }

    pub fn into_grn(self, grn_code: String) -> GoodsReceiptNote {
        let input = self.input;
        GoodsReceiptNote {
            id: self.id,
            gate_entry_id: input.gate_entry_id,
            entry_code: self.entry_code,
            grn_code,
            po_number: input.po_number,
            delivery_challan: input.delivery_challan,
            quantity_received: input.quantity_received,
            remarks: input.remarks,
            status: GrnStatus::AwaitingQa,
            supplier_name: input.supplier_name,
            supplier_address: input.supplier_address,
            supplier_location: input.supplier_location,
            supplier_contact: input.supplier_contact,
            document_status: input.document_status,
            document_date: input.document_date,
            delivery_date: input.delivery_date,
            period: input.period,
            reference: input.reference,
            comment: input.comment,
            items: self.items,
            net_total: self.totals.net_total,
            vat_total: self.totals.vat_total,
            gross_total: self.totals.gross_total,
            qa_notes: None,
            created_by: self.created_by,
            created_by_name: self.created_by_name,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A line item as submitted by the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GrnItemInput {
    #[validate(length(min = 1, max = 500, message = "Item description is required"))]
    pub description: String,
    pub stock_code: Option<String>,
    pub status: Option<String>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub vat_rate: Option<Decimal>,
    pub nominal: Option<String>,
    pub account: Option<String>,
}

/// Input for creating a GRN against a gate entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateGrnInput {
    pub gate_entry_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "PO number is required"))]
    pub po_number: String,
    pub delivery_challan: Option<String>,
    pub quantity_received: Decimal,
    pub remarks: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_location: Option<String>,
    pub supplier_contact: Option<String>,
    pub document_status: Option<String>,
    pub document_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub period: Option<String>,
    pub reference: Option<String>,
    pub comment: Option<String>,
    pub items: Vec<GrnItemInput>,
}
