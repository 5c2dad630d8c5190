use chrono::{Datelike, NaiveDate};

use crate::underwriting::domain::{
    ApplicationSnapshot, Business, BusinessCredit, LoanRequest, PersonalGuarantor,
};

/// Read-only view over a snapshot plus the evaluation date, exposing derived facts.
///
/// Derivations happen on read so the snapshot itself is never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ApplicationFacts<'a> {
    snapshot: &'a ApplicationSnapshot,
    as_of: NaiveDate,
}

impl<'a> ApplicationFacts<'a> {
    pub fn new(snapshot: &'a ApplicationSnapshot, as_of: NaiveDate) -> Self {
        Self { snapshot, as_of }
    }

    pub fn business(&self) -> Option<&'a Business> {
        self.snapshot.business.as_ref()
    }

    pub fn guarantor(&self) -> Option<&'a PersonalGuarantor> {
        self.snapshot.guarantor.as_ref()
    }

    pub fn business_credit(&self) -> Option<&'a BusinessCredit> {
        self.snapshot.business_credit.as_ref()
    }

    pub fn loan_request(&self) -> Option<&'a LoanRequest> {
        self.snapshot.loan_request.as_ref()
    }

    /// Months in business, falling back to whole months from fractional years.
    pub fn months_in_business(&self) -> Option<u32> {
        let business = self.business()?;
        business.months_in_business.or_else(|| {
            business
                .years_in_business
                .filter(|years| *years > 0.0)
                .map(|years| (years * 12.0) as u32)
        })
    }

    pub fn annual_revenue(&self) -> Option<f64> {
        let business = self.business()?;
        business.annual_revenue.or_else(|| {
            business
                .monthly_revenue
                .filter(|monthly| *monthly > 0.0)
                .map(|monthly| monthly * 12.0)
        })
    }

    /// Equipment age in years, derived from the model year against the evaluation date.
    pub fn equipment_age_years(&self) -> Option<f64> {
        let request = self.loan_request()?;
        request.equipment_age_years.or_else(|| {
            request
                .equipment_year
                .filter(|year| *year > 0)
                .map(|year| f64::from(self.as_of.year() - year))
        })
    }

    pub fn down_payment_percent(&self) -> Option<f64> {
        let request = self.loan_request()?;
        request.down_payment_percent.or_else(|| {
            match (request.down_payment_amount, request.equipment_cost) {
                (Some(amount), Some(cost)) if amount > 0.0 && cost > 0.0 => {
                    Some(amount / cost * 100.0)
                }
                _ => None,
            }
        })
    }

    /// Loan-to-value of the request against equipment cost, as a percentage.
    pub fn loan_to_value_percent(&self) -> Option<f64> {
        let request = self.loan_request()?;
        request
            .equipment_cost
            .filter(|cost| *cost > 0.0)
            .map(|cost| request.requested_amount / cost * 100.0)
    }

    /// Years since bankruptcy discharge; `None` when neither a stored value nor a date exists.
    pub fn years_since_bankruptcy(&self) -> Option<f64> {
        let guarantor = self.guarantor()?;
        guarantor.years_since_bankruptcy.or_else(|| {
            guarantor.bankruptcy_discharge_date.map(|discharged| {
                let days = (self.as_of - discharged).num_days().max(0);
                days as f64 / 365.25
            })
        })
    }
}
