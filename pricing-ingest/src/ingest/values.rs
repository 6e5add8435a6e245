//! Canonical nested pricing schema
//!
//! Product-value columns arrive from the parser as flat
//! `Category|Subcategory|FieldType` keys. [`structure`] places each of them
//! on a leaf of [`StructuredProductValues`]; every leaf starts out null and
//! only fields present in the source row are overwritten.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::types::CellValue;

/// Discount / dispensing fee / rebate triple under one channel tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeFields {
    pub discount: Option<CellValue>,
    pub dispensing_fee: Option<CellValue>,
    pub rebate: Option<CellValue>,
}

/// Brand and generic tiers of a dispensing channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelValues {
    pub brand: FeeFields,
    pub generic: FeeFields,
}

/// Overall fees, not split by tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallFeeAndCredit {
    pub pepm_rebate_credit: Option<CellValue>,
    pub pricing_fee: Option<CellValue>,
    pub in_house_pharmacy_fee: Option<CellValue>,
}

/// Blended specialty split by limited-distribution status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendedSpecialty {
    pub ldd: FeeFields,
    pub non_ldd: FeeFields,
}

/// Structured values stored with each product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredProductValues {
    pub overall_fee_and_credit: OverallFeeAndCredit,
    pub retail: ChannelValues,
    pub retail90: ChannelValues,
    pub maintenance: ChannelValues,
    pub mail: ChannelValues,
    pub specialty_mail: ChannelValues,
    pub specialty_retail: ChannelValues,
    pub limited_distribution_mail: ChannelValues,
    pub limited_distribution_retail: ChannelValues,
    pub blended_specialty: BlendedSpecialty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Retail,
    Retail90,
    Maintenance,
    Mail,
    SpecialtyMail,
    SpecialtyRetail,
    LimitedDistributionMail,
    LimitedDistributionRetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Brand,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    Ldd,
    NonLdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeField {
    Discount,
    DispensingFee,
    Rebate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallField {
    PepmRebateCredit,
    PricingFee,
    InHousePharmacyFee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Overall,
    Channel(Channel),
    Blended(Blend),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Fee(FeeField),
    Overall(OverallField),
}

/// One addressable leaf of the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf {
    Overall(OverallField),
    Channel(Channel, Tier, FeeField),
    Blended(Blend, FeeField),
}

const OVERALL_CATEGORY: &str = "Overall Fee & Credit";

/// Category header text (row 1) to schema location
const CATEGORIES: &[(&str, Category)] = &[
    (OVERALL_CATEGORY, Category::Overall),
    ("Retail", Category::Channel(Channel::Retail)),
    ("Retail 90", Category::Channel(Channel::Retail90)),
    ("Maintenance", Category::Channel(Channel::Maintenance)),
    ("Mail", Category::Channel(Channel::Mail)),
    ("Specialty Mail", Category::Channel(Channel::SpecialtyMail)),
    ("Specialty Retail", Category::Channel(Channel::SpecialtyRetail)),
    ("Limited Distribution Mail", Category::Channel(Channel::LimitedDistributionMail)),
    ("Limited Distribution Retail", Category::Channel(Channel::LimitedDistributionRetail)),
    ("LDD Blended Specialty", Category::Blended(Blend::Ldd)),
    ("Non-LDD Blended Specialty", Category::Blended(Blend::NonLdd)),
];

/// Field header text (row 3, prefix stripped) to schema property
const FIELD_TYPES: &[(&str, &str, FieldType)] = &[
    ("DISCOUNT", "Discount", FieldType::Fee(FeeField::Discount)),
    ("DISPENSING FEE", "Dispensing Fee", FieldType::Fee(FeeField::DispensingFee)),
    ("REBATE", "Rebate", FieldType::Fee(FeeField::Rebate)),
    ("PEPM REBATE CREDIT", "PEPM Rebate Credit", FieldType::Overall(OverallField::PepmRebateCredit)),
    ("PRICING FEE", "Pricing Fee", FieldType::Overall(OverallField::PricingFee)),
    ("INHOUSE PHARMACY FEE", "InHouse Pharmacy Fee", FieldType::Overall(OverallField::InHousePharmacyFee)),
];

/// Flat keys from single-channel files, mapped onto retail brand
const LEGACY_KEYS: &[(&str, FeeField)] = &[
    ("DISCOUNT", FeeField::Discount),
    ("REBATE", FeeField::Rebate),
    ("DISPENSING FEE", FeeField::DispensingFee),
];

const CHANNELS: &[Channel] = &[
    Channel::Retail,
    Channel::Retail90,
    Channel::Maintenance,
    Channel::Mail,
    Channel::SpecialtyMail,
    Channel::SpecialtyRetail,
    Channel::LimitedDistributionMail,
    Channel::LimitedDistributionRetail,
];

const FEE_FIELDS: &[FeeField] = &[FeeField::Discount, FeeField::DispensingFee, FeeField::Rebate];

const OVERALL_FIELDS: &[OverallField] = &[
    OverallField::PepmRebateCredit,
    OverallField::PricingFee,
    OverallField::InHousePharmacyFee,
];

impl Channel {
    fn category_name(&self) -> &'static str {
        category_name(Category::Channel(*self))
    }
}

impl Tier {
    fn header(&self) -> &'static str {
        match self {
            Tier::Brand => "Brand",
            Tier::Generic => "Generic",
        }
    }

    fn from_subcategory(subcategory: &str) -> Option<Self> {
        match subcategory.trim().to_lowercase().as_str() {
            "brand" => Some(Tier::Brand),
            "generic" => Some(Tier::Generic),
            _ => None,
        }
    }
}

fn category_name(category: Category) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(_, c)| *c == category)
        .map(|(name, _)| *name)
        .unwrap_or_default()
}

fn field_header(field: FieldType) -> &'static str {
    FIELD_TYPES
        .iter()
        .find(|(_, _, f)| *f == field)
        .map(|(_, header, _)| *header)
        .unwrap_or_default()
}

fn field_key(field: FieldType) -> &'static str {
    FIELD_TYPES
        .iter()
        .find(|(_, _, f)| *f == field)
        .map(|(key, _, _)| *key)
        .unwrap_or_default()
}

impl Leaf {
    /// Resolve a structured key's parts to a leaf
    pub fn resolve(category: &str, subcategory: &str, field_type: &str) -> Result<Leaf, String> {
        let category_key = CATEGORIES
            .iter()
            .find(|(name, _)| *name == category.trim())
            .map(|(_, c)| *c)
            .ok_or_else(|| format!("Unknown category: {}", category))?;

        let field_key = field_type.trim().to_uppercase();
        let field = FIELD_TYPES
            .iter()
            .find(|(key, _, _)| *key == field_key)
            .map(|(_, _, f)| *f)
            .ok_or_else(|| format!("Unknown field type: {}", field_type))?;

        match (category_key, field) {
            (Category::Overall, FieldType::Overall(f)) => Ok(Leaf::Overall(f)),
            (Category::Blended(blend), FieldType::Fee(f)) => Ok(Leaf::Blended(blend, f)),
            (Category::Channel(channel), FieldType::Fee(f)) => Tier::from_subcategory(subcategory)
                .map(|tier| Leaf::Channel(channel, tier, f))
                .ok_or_else(|| {
                    format!("Unknown subcategory '{}' for category {}", subcategory, category)
                }),
            _ => Err(format!(
                "Field type {} does not apply to category {}",
                field_type, category
            )),
        }
    }

    /// Every leaf of the schema, in template column order
    pub fn all() -> Vec<Leaf> {
        let mut leaves: Vec<Leaf> = OVERALL_FIELDS.iter().map(|f| Leaf::Overall(*f)).collect();
        for channel in CHANNELS {
            for tier in [Tier::Brand, Tier::Generic] {
                for field in FEE_FIELDS {
                    leaves.push(Leaf::Channel(*channel, tier, *field));
                }
            }
        }
        for blend in [Blend::Ldd, Blend::NonLdd] {
            for field in FEE_FIELDS {
                leaves.push(Leaf::Blended(blend, *field));
            }
        }
        leaves
    }

    /// Header text for rows 1-3: (category, subcategory, field type)
    pub fn headers(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Leaf::Overall(f) => (OVERALL_CATEGORY, "", field_header(FieldType::Overall(*f))),
            Leaf::Channel(channel, tier, f) => (
                channel.category_name(),
                tier.header(),
                field_header(FieldType::Fee(*f)),
            ),
            Leaf::Blended(blend, f) => (
                category_name(Category::Blended(*blend)),
                "",
                field_header(FieldType::Fee(*f)),
            ),
        }
    }

    /// Canonical structured key, as the parser would produce it
    pub fn key(&self) -> String {
        let (category, subcategory, _) = self.headers();
        let field = match self {
            Leaf::Overall(f) => field_key(FieldType::Overall(*f)),
            Leaf::Channel(_, _, f) | Leaf::Blended(_, f) => field_key(FieldType::Fee(*f)),
        };
        format!("{}|{}|{}", category, subcategory, field)
    }
}

impl FeeFields {
    fn slot(&self, field: FeeField) -> &Option<CellValue> {
        match field {
            FeeField::Discount => &self.discount,
            FeeField::DispensingFee => &self.dispensing_fee,
            FeeField::Rebate => &self.rebate,
        }
    }

    fn slot_mut(&mut self, field: FeeField) -> &mut Option<CellValue> {
        match field {
            FeeField::Discount => &mut self.discount,
            FeeField::DispensingFee => &mut self.dispensing_fee,
            FeeField::Rebate => &mut self.rebate,
        }
    }
}

impl ChannelValues {
    fn tier(&self, tier: Tier) -> &FeeFields {
        match tier {
            Tier::Brand => &self.brand,
            Tier::Generic => &self.generic,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut FeeFields {
        match tier {
            Tier::Brand => &mut self.brand,
            Tier::Generic => &mut self.generic,
        }
    }
}

impl BlendedSpecialty {
    fn blend(&self, blend: Blend) -> &FeeFields {
        match blend {
            Blend::Ldd => &self.ldd,
            Blend::NonLdd => &self.non_ldd,
        }
    }

    fn blend_mut(&mut self, blend: Blend) -> &mut FeeFields {
        match blend {
            Blend::Ldd => &mut self.ldd,
            Blend::NonLdd => &mut self.non_ldd,
        }
    }
}

impl OverallFeeAndCredit {
    fn slot(&self, field: OverallField) -> &Option<CellValue> {
        match field {
            OverallField::PepmRebateCredit => &self.pepm_rebate_credit,
            OverallField::PricingFee => &self.pricing_fee,
            OverallField::InHousePharmacyFee => &self.in_house_pharmacy_fee,
        }
    }

    fn slot_mut(&mut self, field: OverallField) -> &mut Option<CellValue> {
        match field {
            OverallField::PepmRebateCredit => &mut self.pepm_rebate_credit,
            OverallField::PricingFee => &mut self.pricing_fee,
            OverallField::InHousePharmacyFee => &mut self.in_house_pharmacy_fee,
        }
    }
}

impl StructuredProductValues {
    fn channel(&self, channel: Channel) -> &ChannelValues {
        match channel {
            Channel::Retail => &self.retail,
            Channel::Retail90 => &self.retail90,
            Channel::Maintenance => &self.maintenance,
            Channel::Mail => &self.mail,
            Channel::SpecialtyMail => &self.specialty_mail,
            Channel::SpecialtyRetail => &self.specialty_retail,
            Channel::LimitedDistributionMail => &self.limited_distribution_mail,
            Channel::LimitedDistributionRetail => &self.limited_distribution_retail,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelValues {
        match channel {
            Channel::Retail => &mut self.retail,
            Channel::Retail90 => &mut self.retail90,
            Channel::Maintenance => &mut self.maintenance,
            Channel::Mail => &mut self.mail,
            Channel::SpecialtyMail => &mut self.specialty_mail,
            Channel::SpecialtyRetail => &mut self.specialty_retail,
            Channel::LimitedDistributionMail => &mut self.limited_distribution_mail,
            Channel::LimitedDistributionRetail => &mut self.limited_distribution_retail,
        }
    }

    pub fn get(&self, leaf: Leaf) -> Option<&CellValue> {
        let slot = match leaf {
            Leaf::Overall(f) => self.overall_fee_and_credit.slot(f),
            Leaf::Channel(channel, tier, f) => self.channel(channel).tier(tier).slot(f),
            Leaf::Blended(blend, f) => self.blended_specialty.blend(blend).slot(f),
        };
        slot.as_ref()
    }

    pub fn set(&mut self, leaf: Leaf, value: CellValue) {
        let slot = match leaf {
            Leaf::Overall(f) => self.overall_fee_and_credit.slot_mut(f),
            Leaf::Channel(channel, tier, f) => self.channel_mut(channel).tier_mut(tier).slot_mut(f),
            Leaf::Blended(blend, f) => self.blended_specialty.blend_mut(blend).slot_mut(f),
        };
        *slot = Some(value);
    }

    /// Flatten back to canonical structured keys, non-null leaves only
    ///
    /// Overall and blended categories carry no subcategory, so their keys have
    /// an empty middle segment.
    pub fn flatten(&self) -> BTreeMap<String, CellValue> {
        Leaf::all()
            .into_iter()
            .filter_map(|leaf| self.get(leaf).map(|v| (leaf.key(), v.clone())))
            .collect()
    }
}

/// Map flat product values onto the nested schema
///
/// Unknown categories, subcategories and field types are dropped with a
/// warning; blank values leave the schema default in place.
pub fn structure(flat_values: &BTreeMap<String, CellValue>) -> StructuredProductValues {
    let mut structured = StructuredProductValues::default();

    for (key, field) in LEGACY_KEYS {
        if let Some(value) = flat_values.get(*key).filter(|v| !v.is_blank()) {
            debug!("Found legacy {} field: {}", key, value);
            structured.set(Leaf::Channel(Channel::Retail, Tier::Brand, *field), value.clone());
        }
    }

    for (key, value) in flat_values {
        if value.is_blank() || !key.contains('|') {
            continue;
        }

        let mut parts = key.splitn(3, '|');
        let (category, subcategory, field_type) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(s), Some(f)) => (c, s, f),
            _ => {
                warn!("Malformed structured key: {}", key);
                continue;
            }
        };

        match Leaf::resolve(category, subcategory, field_type) {
            Ok(leaf) => {
                debug!("Set {:?} = {}", leaf, value);
                structured.set(leaf, value.clone());
            }
            Err(reason) => warn!("{}", reason),
        }
    }

    structured
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(entries: &[(&str, CellValue)]) -> BTreeMap<String, CellValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_are_null() {
        let structured = structure(&BTreeMap::new());
        assert_eq!(structured, StructuredProductValues::default());

        let json = serde_json::to_value(&structured).unwrap();
        assert!(json["retail"]["brand"]["discount"].is_null());
        assert!(json["blendedSpecialty"]["nonLdd"]["rebate"].is_null());
        assert!(json["overallFeeAndCredit"]["inHousePharmacyFee"].is_null());
    }

    #[test]
    fn test_channel_keys_land_on_tier() {
        let structured = structure(&flat(&[
            ("Retail|Brand|DISCOUNT", CellValue::Number(0.18)),
            ("Mail|Generic|DISPENSING FEE", CellValue::Number(1.25)),
            ("Retail 90|brand|Rebate", CellValue::Number(42.0)),
        ]));

        assert_eq!(structured.retail.brand.discount, Some(CellValue::Number(0.18)));
        assert_eq!(structured.mail.generic.dispensing_fee, Some(CellValue::Number(1.25)));
        assert_eq!(structured.retail90.brand.rebate, Some(CellValue::Number(42.0)));
        assert_eq!(structured.retail.generic.discount, None);
    }

    #[test]
    fn test_overall_and_blended_ignore_subcategory() {
        let structured = structure(&flat(&[
            ("Overall Fee & Credit||PRICING FEE", CellValue::Number(2.5)),
            ("LDD Blended Specialty|Anything|DISCOUNT", CellValue::Number(0.2)),
            ("Non-LDD Blended Specialty||REBATE", CellValue::Number(30.0)),
        ]));

        assert_eq!(structured.overall_fee_and_credit.pricing_fee, Some(CellValue::Number(2.5)));
        assert_eq!(structured.blended_specialty.ldd.discount, Some(CellValue::Number(0.2)));
        assert_eq!(structured.blended_specialty.non_ldd.rebate, Some(CellValue::Number(30.0)));
    }

    #[test]
    fn test_legacy_flat_keys_map_to_retail_brand() {
        let structured = structure(&flat(&[
            ("DISCOUNT", CellValue::Number(0.15)),
            ("DISPENSING FEE", CellValue::Number(1.0)),
            ("REBATE", CellValue::Number(10.0)),
        ]));

        assert_eq!(structured.retail.brand.discount, Some(CellValue::Number(0.15)));
        assert_eq!(structured.retail.brand.dispensing_fee, Some(CellValue::Number(1.0)));
        assert_eq!(structured.retail.brand.rebate, Some(CellValue::Number(10.0)));
    }

    #[test]
    fn test_unknown_combinations_are_dropped() {
        let structured = structure(&flat(&[
            ("Drive Thru|Brand|DISCOUNT", CellValue::Number(0.1)),
            ("Retail|Brand|MARKUP", CellValue::Number(0.1)),
            ("Retail|Preferred|DISCOUNT", CellValue::Number(0.1)),
            ("Overall Fee & Credit||DISCOUNT", CellValue::Number(0.1)),
            ("Retail|Brand", CellValue::Number(0.1)),
            ("Retail|Brand|REBATE", CellValue::from("")),
        ]));
        assert_eq!(structured, StructuredProductValues::default());
    }

    #[test]
    fn test_flatten_reproduces_supplied_fields() {
        let input = flat(&[
            ("Retail|Brand|DISCOUNT", CellValue::Number(0.18)),
            ("Specialty Mail|Generic|REBATE", CellValue::from("N/A")),
            ("Overall Fee & Credit||PEPM REBATE CREDIT", CellValue::Number(3.0)),
            ("Non-LDD Blended Specialty||DISPENSING FEE", CellValue::Number(0.75)),
        ]);
        let mut with_noise = input.clone();
        with_noise.insert("Unknown|Brand|DISCOUNT".into(), CellValue::Number(9.0));

        let flattened = structure(&with_noise).flatten();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_every_leaf_key_resolves_to_itself() {
        for leaf in Leaf::all() {
            let key = leaf.key();
            let parts: Vec<&str> = key.split('|').collect();
            assert_eq!(Leaf::resolve(parts[0], parts[1], parts[2]), Ok(leaf), "{}", key);
        }
        assert_eq!(Leaf::all().len(), 3 + 8 * 2 * 3 + 2 * 3);
    }
}
