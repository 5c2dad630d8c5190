//! Lender policy management: drafts, partial updates, and the service
//! operations that edit lender, program, and criterion records.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    default_true, default_weight, Criterion, CriterionId, Lender, LenderId, Operator, Program,
    ProgramId,
};
use super::repository::{ApplicationRepository, PolicyRepository, RepositoryError, ResultStore};
use super::service::{UnderwritingError, UnderwritingService};

/// Criterion content as submitted by an operator; the id is assigned on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDraft {
    pub criterion_type: String,
    pub name: String,
    pub operator: Operator,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    #[serde(default)]
    pub numeric_value_min: Option<f64>,
    #[serde(default)]
    pub numeric_value_max: Option<f64>,
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub list_values: Vec<String>,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub failure_message: Option<String>,
}

impl CriterionDraft {
    fn into_criterion(self, id: CriterionId) -> Criterion {
        Criterion {
            id,
            criterion_type: self.criterion_type,
            name: self.name,
            operator: self.operator,
            numeric_value: self.numeric_value,
            numeric_value_min: self.numeric_value_min,
            numeric_value_max: self.numeric_value_max,
            string_value: self.string_value,
            list_values: self.list_values,
            is_required: self.is_required,
            weight: self.weight,
            is_active: self.is_active,
            failure_message: self.failure_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDraft {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub criteria: Vec<CriterionDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LenderDraft {
    pub name: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub programs: Vec<ProgramDraft>,
}

/// Partial lender update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LenderUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Partial program update; criteria are edited through their own operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Next free ids, one past the largest id in use across every lender.
struct PolicyIds {
    lender: u64,
    program: u64,
    criterion: u64,
}

impl PolicyIds {
    fn scan(lenders: &[Lender]) -> Self {
        let programs = || lenders.iter().flat_map(|lender| lender.programs.iter());
        Self {
            lender: lenders.iter().map(|lender| lender.id.0).max().unwrap_or(0) + 1,
            program: programs().map(|program| program.id.0).max().unwrap_or(0) + 1,
            criterion: programs()
                .flat_map(|program| program.criteria.iter())
                .map(|criterion| criterion.id.0)
                .max()
                .unwrap_or(0)
                + 1,
        }
    }

    fn next_lender(&mut self) -> LenderId {
        let id = LenderId(self.lender);
        self.lender += 1;
        id
    }

    fn next_program(&mut self) -> ProgramId {
        let id = ProgramId(self.program);
        self.program += 1;
        id
    }

    fn next_criterion(&mut self) -> CriterionId {
        let id = CriterionId(self.criterion);
        self.criterion += 1;
        id
    }

    fn build_program(&mut self, draft: ProgramDraft) -> Program {
        Program {
            id: self.next_program(),
            name: draft.name,
            is_active: draft.is_active,
            priority: draft.priority,
            criteria: draft
                .criteria
                .into_iter()
                .map(|criterion| criterion.into_criterion(self.next_criterion()))
                .collect(),
        }
    }
}

fn require_text(issues: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(format!("{field} is required"));
    }
}

fn program_issues(program: &Program) -> Vec<String> {
    let mut issues = Vec::new();
    require_text(&mut issues, "program name", &program.name);
    issues.extend(criterion_issues(&program.criteria));
    issues
}

fn criterion_issues(criteria: &[Criterion]) -> Vec<String> {
    let mut issues = Vec::new();
    for criterion in criteria {
        require_text(&mut issues, "criterion type", &criterion.criterion_type);
        require_text(&mut issues, "criterion name", &criterion.name);
        if let Err(issue) = criterion.validate() {
            issues.push(issue.to_string());
        }
    }
    issues
}

fn lender_issues(lender: &Lender) -> Vec<String> {
    let mut issues = Vec::new();
    require_text(&mut issues, "lender name", &lender.name);
    require_text(&mut issues, "lender display name", &lender.display_name);
    for program in &lender.programs {
        issues.extend(program_issues(program));
    }
    issues
}

fn reject_issues(issues: Vec<String>) -> Result<(), UnderwritingError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(UnderwritingError::InvalidPolicy(issues))
    }
}

fn find_program(lender: &mut Lender, id: ProgramId) -> Result<&mut Program, UnderwritingError> {
    lender
        .programs
        .iter_mut()
        .find(|program| program.id == id)
        .ok_or(UnderwritingError::ProgramNotFound(id))
}

fn find_criterion(
    program: &mut Program,
    id: CriterionId,
) -> Result<&mut Criterion, UnderwritingError> {
    program
        .criteria
        .iter_mut()
        .find(|criterion| criterion.id == id)
        .ok_or(UnderwritingError::CriterionNotFound(id))
}

impl<A, P, S> UnderwritingService<A, P, S>
where
    A: ApplicationRepository + 'static,
    P: PolicyRepository + 'static,
    S: ResultStore + 'static,
{
    /// Active lenders, or every lender when `include_inactive` is set.
    pub fn lenders(&self, include_inactive: bool) -> Result<Vec<Lender>, UnderwritingError> {
        let lenders = if include_inactive {
            self.policies.lenders()?
        } else {
            self.policies.active_lenders()?
        };
        Ok(lenders)
    }

    pub fn lender(&self, id: LenderId) -> Result<Lender, UnderwritingError> {
        self.policies
            .lenders()?
            .into_iter()
            .find(|lender| lender.id == id)
            .ok_or(UnderwritingError::LenderNotFound(id))
    }

    /// Store a new lender with its programs and criteria. Names are unique.
    pub fn create_lender(&self, draft: LenderDraft) -> Result<Lender, UnderwritingError> {
        let _guard = self.policy_write_lock()?;
        let existing = self.policies.lenders()?;
        if existing.iter().any(|lender| lender.name == draft.name) {
            return Err(UnderwritingError::DuplicateLender(draft.name));
        }

        let mut ids = PolicyIds::scan(&existing);
        let lender = Lender {
            id: ids.next_lender(),
            name: draft.name,
            display_name: draft.display_name,
            is_active: draft.is_active,
            programs: draft
                .programs
                .into_iter()
                .map(|program| ids.build_program(program))
                .collect(),
        };
        reject_issues(lender_issues(&lender))?;

        self.policies.save_lender(lender.clone())?;
        info!(lender = %lender.name, id = lender.id.0, programs = lender.programs.len(), "lender created");
        Ok(lender)
    }

    pub fn update_lender(
        &self,
        id: LenderId,
        update: LenderUpdate,
    ) -> Result<Lender, UnderwritingError> {
        let _guard = self.policy_write_lock()?;
        let existing = self.policies.lenders()?;
        if let Some(name) = &update.name {
            if existing
                .iter()
                .any(|lender| lender.id != id && &lender.name == name)
            {
                return Err(UnderwritingError::DuplicateLender(name.clone()));
            }
        }

        let mut lender = existing
            .into_iter()
            .find(|lender| lender.id == id)
            .ok_or(UnderwritingError::LenderNotFound(id))?;
        if let Some(name) = update.name {
            lender.name = name;
        }
        if let Some(display_name) = update.display_name {
            lender.display_name = display_name;
        }
        if let Some(is_active) = update.is_active {
            lender.is_active = is_active;
        }

        let mut issues = Vec::new();
        require_text(&mut issues, "lender name", &lender.name);
        require_text(&mut issues, "lender display name", &lender.display_name);
        reject_issues(issues)?;

        self.policies.save_lender(lender.clone())?;
        info!(lender = %lender.name, id = id.0, "lender updated");
        Ok(lender)
    }

    /// Remove a lender with all of its programs and criteria.
    pub fn delete_lender(&self, id: LenderId) -> Result<(), UnderwritingError> {
        let _guard = self.policy_write_lock()?;
        self.policies.delete_lender(id).map_err(|error| match error {
            RepositoryError::NotFound => UnderwritingError::LenderNotFound(id),
            other => other.into(),
        })?;
        info!(id = id.0, "lender deleted");
        Ok(())
    }

    pub fn programs(&self, lender_id: LenderId) -> Result<Vec<Program>, UnderwritingError> {
        Ok(self.lender(lender_id)?.programs)
    }

    pub fn add_program(
        &self,
        lender_id: LenderId,
        draft: ProgramDraft,
    ) -> Result<Program, UnderwritingError> {
        self.edit_lender(lender_id, |lender, ids| {
            let program = ids.build_program(draft);
            reject_issues(program_issues(&program))?;
            lender.programs.push(program.clone());
            info!(lender = %lender.name, program = %program.name, "program created");
            Ok(program)
        })
    }

    pub fn update_program(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
        update: ProgramUpdate,
    ) -> Result<Program, UnderwritingError> {
        self.edit_lender(lender_id, |lender, _| {
            let program = find_program(lender, program_id)?;
            if let Some(name) = update.name {
                let mut issues = Vec::new();
                require_text(&mut issues, "program name", &name);
                reject_issues(issues)?;
                program.name = name;
            }
            if let Some(is_active) = update.is_active {
                program.is_active = is_active;
            }
            if let Some(priority) = update.priority {
                program.priority = priority;
            }
            Ok(program.clone())
        })
    }

    pub fn delete_program(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
    ) -> Result<(), UnderwritingError> {
        self.edit_lender(lender_id, |lender, _| {
            let before = lender.programs.len();
            lender.programs.retain(|program| program.id != program_id);
            if lender.programs.len() == before {
                return Err(UnderwritingError::ProgramNotFound(program_id));
            }
            info!(lender = %lender.name, program = program_id.0, "program deleted");
            Ok(())
        })
    }

    pub fn criteria(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
    ) -> Result<Vec<Criterion>, UnderwritingError> {
        let mut lender = self.lender(lender_id)?;
        Ok(find_program(&mut lender, program_id)?.criteria.clone())
    }

    /// Append a criterion to a program; it must pass [`Criterion::validate`].
    pub fn add_criterion(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
        draft: CriterionDraft,
    ) -> Result<Criterion, UnderwritingError> {
        self.edit_lender(lender_id, |lender, ids| {
            let program = find_program(lender, program_id)?;
            let criterion = draft.into_criterion(ids.next_criterion());
            reject_issues(criterion_issues(std::slice::from_ref(&criterion)))?;
            program.criteria.push(criterion.clone());
            Ok(criterion)
        })
    }

    /// Replace a criterion's content, keeping its id and position.
    pub fn replace_criterion(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
        criterion_id: CriterionId,
        draft: CriterionDraft,
    ) -> Result<Criterion, UnderwritingError> {
        self.edit_lender(lender_id, |lender, _| {
            let program = find_program(lender, program_id)?;
            let slot = find_criterion(program, criterion_id)?;
            let criterion = draft.into_criterion(criterion_id);
            reject_issues(criterion_issues(std::slice::from_ref(&criterion)))?;
            *slot = criterion.clone();
            Ok(criterion)
        })
    }

    pub fn delete_criterion(
        &self,
        lender_id: LenderId,
        program_id: ProgramId,
        criterion_id: CriterionId,
    ) -> Result<(), UnderwritingError> {
        self.edit_lender(lender_id, |lender, _| {
            let program = find_program(lender, program_id)?;
            let before = program.criteria.len();
            program.criteria.retain(|criterion| criterion.id != criterion_id);
            if program.criteria.len() == before {
                return Err(UnderwritingError::CriterionNotFound(criterion_id));
            }
            Ok(())
        })
    }

    /// Load one lender, apply `edit`, and save the aggregate when the edit succeeds.
    fn edit_lender<T>(
        &self,
        lender_id: LenderId,
        edit: impl FnOnce(&mut Lender, &mut PolicyIds) -> Result<T, UnderwritingError>,
    ) -> Result<T, UnderwritingError> {
        let _guard = self.policy_write_lock()?;
        let existing = self.policies.lenders()?;
        let mut ids = PolicyIds::scan(&existing);
        let mut lender = existing
            .into_iter()
            .find(|lender| lender.id == lender_id)
            .ok_or(UnderwritingError::LenderNotFound(lender_id))?;

        let outcome = edit(&mut lender, &mut ids)?;
        self.policies.save_lender(lender)?;
        Ok(outcome)
    }
}
