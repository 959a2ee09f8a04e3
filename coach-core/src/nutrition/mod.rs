//! nutrition — basal metabolic rate (Mifflin-St Jeor)

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const AGE_RANGE: (u32, u32) = (10, 100);
pub const WEIGHT_RANGE_KG: (f32, f32) = (30.0, 200.0);
pub const HEIGHT_RANGE_CM: (f32, f32) = (100.0, 250.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => bail!("unknown gender '{other}' (expected male or female)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BmrInput {
    pub gender: Gender,
    pub age: u32,
    pub weight_kg: f32,
    pub height_cm: f32,
}

impl BmrInput {
    /// Check the inputs against the ranges the calculator accepts.
    pub fn validate(&self) -> Result<()> {
        if !(AGE_RANGE.0..=AGE_RANGE.1).contains(&self.age) {
            bail!(
                "age {} is outside {}..={} years",
                self.age,
                AGE_RANGE.0,
                AGE_RANGE.1
            );
        }
        if !(WEIGHT_RANGE_KG.0..=WEIGHT_RANGE_KG.1).contains(&self.weight_kg) {
            bail!(
                "weight {} kg is outside {}..={} kg",
                self.weight_kg,
                WEIGHT_RANGE_KG.0,
                WEIGHT_RANGE_KG.1
            );
        }
        if !(HEIGHT_RANGE_CM.0..=HEIGHT_RANGE_CM.1).contains(&self.height_cm) {
            bail!(
                "height {} cm is outside {}..={} cm",
                self.height_cm,
                HEIGHT_RANGE_CM.0,
                HEIGHT_RANGE_CM.1
            );
        }
        Ok(())
    }

    /// Basal metabolic rate in kcal/day.
    ///
    /// `10·w + 6.25·h − 5·a + 5` for men, `… − 161` for women.  No range
    /// checks; call [`validate`](Self::validate) first for user input.
    pub fn bmr(&self) -> f32 {
        let base = 10.0 * self.weight_kg + 6.25 * self.height_cm - 5.0 * self.age as f32;
        match self.gender {
            Gender::Male => base + 5.0,
            Gender::Female => base - 161.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(gender: Gender, age: u32, weight_kg: f32, height_cm: f32) -> BmrInput {
        BmrInput {
            gender,
            age,
            weight_kg,
            height_cm,
        }
    }

    #[test]
    fn test_bmr_male() {
        let bmr = input(Gender::Male, 25, 70.0, 170.0).bmr();
        assert!((bmr - 1642.5).abs() < 1e-3, "got {bmr}");
    }

    #[test]
    fn test_bmr_female_is_166_lower() {
        let male = input(Gender::Male, 25, 70.0, 170.0).bmr();
        let female = input(Gender::Female, 25, 70.0, 170.0).bmr();
        assert!((female - 1476.5).abs() < 1e-3, "got {female}");
        assert!((male - female - 166.0).abs() < 1e-3);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(input(Gender::Male, 10, 30.0, 100.0).validate().is_ok());
        assert!(input(Gender::Female, 100, 200.0, 250.0).validate().is_ok());
        assert!(input(Gender::Male, 9, 70.0, 170.0).validate().is_err());
        assert!(input(Gender::Male, 25, 201.0, 170.0).validate().is_err());
        assert!(input(Gender::Male, 25, 70.0, 99.5).validate().is_err());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("Male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!(" f ".parse::<Gender>().unwrap(), Gender::Female);
        assert!("other".parse::<Gender>().is_err());
        assert_eq!(Gender::Female.to_string(), "Female");
    }
}
