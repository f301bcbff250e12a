//! Field Resolver Module
//!
//! Reconciles the many shapes a valuation record has been written in over the
//! years (grouped objects, flattened top-level keys, renamed keys, form data
//! duplicates) into one flat canonical record.
//!
//! Every canonical field declares an ordered list of candidate paths. The
//! first candidate holding a non-empty value wins. The `formData` group holds
//! what the user typed into the form and is consulted before any declared
//! candidate, except for image fields where it is only the last resort.

use crate::formatter;
use crate::record::{self, NOT_AVAILABLE};
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the highest-priority group holding user-entered values.
pub const FORM_OVERRIDES_KEY: &str = "formData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Text that may have been stored as an address object.
    Address,
    ImageList,
    /// Image lists keyed by area name.
    ImageMap,
}

impl FieldKind {
    fn is_image(self) -> bool {
        matches!(self, FieldKind::ImageList | FieldKind::ImageMap)
    }
}

/// A canonical field and where to look for it.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub candidates: &'static [&'static str],
}

const fn text(name: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Text, candidates }
}

const fn address(name: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Address, candidates }
}

const fn images(name: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::ImageList, candidates }
}

/// The canonical field table, in the order fields are resolved.
pub static FIELDS: &[FieldSpec] = &[
    // Identification and engagement
    text("uniqueId", &["uniqueId", "_id", "id"]),
    text("clientName", &["ownerDetails.clientName", "clientName", "customerName"]),
    text("ownerName", &["ownerDetails.ownerName", "ownerDetails.owners.0.name", "ownerName", "nameOfOwner"]),
    address("ownerAddress", &["ownerDetails.ownerAddress", "ownerAddress", "addressOfOwner"]),
    text("ownerPhone", &["ownerDetails.mobileNumber", "ownerPhone", "mobileNumber"]),
    text("bankName", &["bankDetails.bankName", "bankName"]),
    text("branchName", &["bankDetails.branchName", "branchName", "branch"]),
    text("applicationNo", &["bankDetails.applicationNo", "applicationNo", "loanAccountNo"]),
    text("purposeOfValuation", &["valuationDetails.purpose", "purposeOfValuation", "purpose"]),
    text("dateOfInspection", &["inspectionDetails.dateOfInspection", "dateOfInspection", "inspectionDate"]),
    text("dateOfValuation", &["valuationDetails.dateOfValuation", "dateOfValuation", "valuationDate"]),
    text("reportDate", &["reportDate", "createdAt"]),
    text("engineerName", &["inspectionDetails.engineerName", "engineerName", "assignedEngineer"]),
    text("personMetAtSite", &["inspectionDetails.personMet", "personMetAtSite", "personMet"]),
    text("status", &["status"]),
    // Documents
    text("listOfDocuments", &["documentDetails.listOfDocuments", "listOfDocuments", "documentsProduced"]),
    text("agreementForSale", &["documentDetails.agreementForSale", "agreementForSale"]),
    text("commencementCertificate", &["documentDetails.commencementCertificate", "commencementCertificate"]),
    text("occupancyCertificate", &["documentDetails.occupancyCertificate", "occupancyCertificate"]),
    text("approvedPlan", &["documentDetails.approvedPlan", "approvedPlan", "sanctionedPlan"]),
    text("approvedPlanAuthority", &["documentDetails.approvingAuthority", "approvedPlanAuthority", "approvingAuthority"]),
    text("deviationsFromPlan", &["documentDetails.deviations", "deviationsFromPlan"]),
    // Location
    address("postalAddress", &["locationDetails.postalAddress", "postalAddress", "addressForCommunication", "propertyAddress", "address"]),
    text("apartmentCTSNo", &["locationDetails.ctsNo", "apartmentCTSNo", "ctsNo", "ctsNumber", "surveyNo"]),
    text("plotNo", &["locationDetails.plotNo", "plotNo", "plotNumber"]),
    text("sectorNo", &["locationDetails.sectorNo", "sectorNo"]),
    text("village", &["locationDetails.village", "village", "mouje"]),
    text("wardNo", &["locationDetails.wardNo", "wardNo", "ward"]),
    text("taluka", &["locationDetails.taluka", "taluka", "tehsil"]),
    text("district", &["locationDetails.district", "district"]),
    text("city", &["locationDetails.city", "city"]),
    text("state", &["locationDetails.state", "state"]),
    text("pinCode", &["locationDetails.pinCode", "pinCode", "pincode"]),
    text("landmark", &["locationDetails.landmark", "landmark", "nearbyLandmark"]),
    text("latitude", &["locationDetails.coordinates.latitude", "locationDetails.latitude", "latitude"]),
    text("longitude", &["locationDetails.coordinates.longitude", "locationDetails.longitude", "longitude"]),
    text("boundaryNorth", &["locationDetails.boundaries.north", "boundaryNorth", "northBoundary"]),
    text("boundarySouth", &["locationDetails.boundaries.south", "boundarySouth", "southBoundary"]),
    text("boundaryEast", &["locationDetails.boundaries.east", "boundaryEast", "eastBoundary"]),
    text("boundaryWest", &["locationDetails.boundaries.west", "boundaryWest", "westBoundary"]),
    text("municipalCorporation", &["locationDetails.municipalCorporation", "municipalCorporation", "localAuthority"]),
    text("areaClassification", &["locationDetails.areaClassification", "areaClassification", "urbanRural"]),
    text("classificationOfLocality", &["localityDetails.classification", "classificationOfLocality", "localityClass"]),
    // Property and apartment
    text("propertyType", &["propertyDetails.propertyType", "propertyType", "typeOfProperty"]),
    text("occupancyStatus", &["propertyDetails.occupancyStatus", "occupancyStatus", "occupiedBy"]),
    text("tenantName", &["propertyDetails.tenantName", "tenantName"]),
    text("monthlyRent", &["propertyDetails.monthlyRent", "monthlyRent"]),
    text("buildingName", &["apartmentDetails.buildingName", "buildingName", "projectName"]),
    text("societyName", &["apartmentDetails.societyName", "societyName"]),
    text("flatNo", &["apartmentDetails.flatNo", "flatNo", "unitNo"]),
    text("floorOfFlat", &["apartmentDetails.floor", "floorOfFlat", "floor"]),
    text("numberOfFloors", &["apartmentDetails.numberOfFloors", "numberOfFloors", "totalFloors"]),
    text("numberOfFlatsOnFloor", &["apartmentDetails.flatsPerFloor", "numberOfFlatsOnFloor"]),
    text("yearOfConstruction", &["apartmentDetails.yearOfConstruction", "yearOfConstruction", "constructionYear"]),
    text("ageOfBuilding", &["apartmentDetails.ageOfBuilding", "ageOfBuilding", "buildingAge"]),
    text("residualLife", &["apartmentDetails.residualLife", "residualLife", "futureLife"]),
    text("typeOfStructure", &["apartmentDetails.typeOfStructure", "typeOfStructure", "structureType"]),
    text("carpetArea", &["apartmentDetails.carpetArea", "areaDetails.carpetArea", "carpetArea"]),
    text("builtUpArea", &["apartmentDetails.builtUpArea", "areaDetails.builtUpArea", "builtUpArea", "builtupArea"]),
    text("superBuiltUpArea", &["apartmentDetails.superBuiltUpArea", "areaDetails.saleableArea", "superBuiltUpArea", "saleableArea"]),
    text("undividedLandShare", &["apartmentDetails.udsArea", "undividedLandShare", "udsArea"]),
    text("liftAvailable", &["apartmentDetails.lift", "liftAvailable", "lift"]),
    text("parkingAvailable", &["apartmentDetails.parking", "parkingAvailable", "parking"]),
    text("waterSupply", &["apartmentDetails.waterSupply", "waterSupply"]),
    text("electricitySupply", &["apartmentDetails.electricitySupply", "electricitySupply"]),
    text("sewerageSystem", &["apartmentDetails.sewerage", "sewerageSystem", "drainage"]),
    text("flooring", &["specifications.flooring", "flooring"]),
    text("doors", &["specifications.doors", "doors"]),
    text("windows", &["specifications.windows", "windows"]),
    text("roof", &["specifications.roof", "roof", "roofing"]),
    text("fittings", &["specifications.fittings", "fittings", "electricalFittings"]),
    text("qualityOfConstruction", &["apartmentDetails.quality", "qualityOfConstruction", "constructionQuality"]),
    text("appearanceOfBuilding", &["apartmentDetails.appearance", "appearanceOfBuilding"]),
    text("maintenanceOfBuilding", &["apartmentDetails.maintenance", "maintenanceOfBuilding"]),
    text("amenities", &["apartmentDetails.amenities", "amenities", "facilities"]),
    // Locality
    text("distanceFromRailwayStation", &["localityDetails.railwayStation", "distanceFromRailwayStation", "nearestRailwayStation"]),
    text("distanceFromBusStop", &["localityDetails.busStop", "distanceFromBusStop", "nearestBusStop"]),
    text("distanceFromCityCentre", &["localityDetails.cityCentre", "distanceFromCityCentre", "distanceFromCityCenter"]),
    text("nearbyHospital", &["localityDetails.hospital", "nearbyHospital"]),
    text("nearbySchool", &["localityDetails.school", "nearbySchool"]),
    text("civicAmenities", &["localityDetails.civicAmenities", "civicAmenities"]),
    text("roadWidth", &["localityDetails.roadWidth", "roadWidth", "approachRoadWidth"]),
    text("floodProneArea", &["localityDetails.floodProne", "floodProneArea", "floodProne"]),
    text("landUse", &["localityDetails.landUse", "landUse", "zoning"]),
    text("marketability", &["marketDetails.marketability", "marketability"]),
    text("demandSupply", &["marketDetails.demandSupply", "demandSupply"]),
    // Rates
    text("ratePerSqft", &["rateDetails.ratePerSqft", "ratesDetails.ratePerSqft", "ratePerSqft", "rate"]),
    text("guidelineRate", &["rateDetails.guidelineRate", "rateDetails.jantriRate", "guidelineRate", "jantriRate", "readyReckonerRate"]),
    text("compositeRate", &["rateDetails.compositeRate", "ratesDetails.compositeRate", "compositeRate"]),
    text("depreciationPercent", &["rateDetails.depreciation", "depreciationPercent", "depreciation"]),
    text("depreciatedRate", &["rateDetails.depreciatedRate", "depreciatedRate"]),
    text("replacementCost", &["rateDetails.replacementCost", "replacementCost"]),
    text("comparableSales", &["rateDetails.comparableSales", "comparableSales", "marketInstances"]),
    // Valuation line items
    text("presentValueOfFlat", &["valuationDetails.presentValue", "valuationItems.presentValueOfFlat", "presentValueOfFlat"]),
    text("wardrobesValue", &["valuationDetails.wardrobes", "valuationItems.wardrobes", "wardrobesValue"]),
    text("showcasesValue", &["valuationDetails.showcases", "valuationItems.showcases", "showcasesValue"]),
    text("kitchenArrangementsValue", &["valuationDetails.kitchenArrangements", "valuationItems.kitchenArrangements", "kitchenArrangementsValue"]),
    text("superfineFinishValue", &["valuationDetails.superfineFinish", "valuationItems.superfineFinish", "superfineFinishValue"]),
    text("interiorDecorationsValue", &["valuationDetails.interiorDecorations", "valuationItems.interiorDecorations", "interiorDecorationsValue"]),
    text("electricityDepositsValue", &["valuationDetails.electricityDeposits", "valuationItems.electricityDeposits", "electricityDepositsValue"]),
    text("collapsibleGatesValue", &["valuationDetails.collapsibleGates", "valuationItems.collapsibleGates", "collapsibleGatesValue"]),
    text("potentialValue", &["valuationDetails.potentialValue", "valuationItems.potentialValue", "potentialValue"]),
    text("otherItemsValue", &["valuationDetails.others", "valuationItems.others", "otherItemsValue"]),
    text("totalValuationItemsWords", &["valuationDetails.totalInWords", "totalValuationItemsWords"]),
    // Headline values and their words
    text("fairMarketValue", &["valuationDetails.fairMarketValue", "rateDetails.fairMarketValue", "fairMarketValue", "marketValue"]),
    text("fairMarketValueWords", &["valuationDetails.fairMarketValueWords", "fairMarketValueWords", "marketValueInWords"]),
    text("realizableValue", &["valuationDetails.realizableValue", "rateDetails.realizableValue", "realizableValue", "realisableValue"]),
    text("realizableValueWords", &["valuationDetails.realizableValueWords", "realizableValueWords", "realisableValueWords"]),
    text("distressValue", &["valuationDetails.distressValue", "rateDetails.distressValue", "distressValue", "distressSaleValue"]),
    text("distressValueWords", &["valuationDetails.distressValueWords", "distressValueWords"]),
    text("agreementValue", &["valuationDetails.agreementValue", "agreementValue", "saleDeedValue"]),
    text("agreementValueWords", &["valuationDetails.agreementValueWords", "agreementValueWords"]),
    text("circleRateValue", &["valuationDetails.circleRateValue", "rateDetails.guidelineValue", "circleRateValue", "guidelineValue", "jantriValue"]),
    text("circleRateValueWords", &["valuationDetails.circleRateValueWords", "circleRateValueWords", "guidelineValueWords"]),
    text("insurableValue", &["valuationDetails.insurableValue", "rateDetails.insurableValue", "insurableValue", "insuranceValue"]),
    text("insurableValueWords", &["valuationDetails.insurableValueWords", "insurableValueWords"]),
    // Declaration
    text("valuerName", &["valuerDetails.name", "valuerName"]),
    text("valuerRegistrationNo", &["valuerDetails.registrationNo", "valuerRegistrationNo", "registrationNo"]),
    text("valuerQualification", &["valuerDetails.qualification", "valuerQualification"]),
    text("placeOfValuation", &["valuerDetails.place", "placeOfValuation", "place"]),
    text("remarks", &["remarks", "valuerRemarks", "comments"]),
    text("enclosures", &["documentDetails.enclosures", "enclosures"]),
    text("managerFeedback", &["managerFeedback", "feedback"]),
    // Images
    images("propertyImages", &["imageDetails.propertyImages", "images.propertyImages", "propertyImages", "photos"]),
    images("locationImages", &["imageDetails.locationImages", "images.locationImages", "locationImages", "locationMap"]),
    images("documentImages", &["imageDetails.documentImages", "images.documentImages", "documentImages", "documentPreviews"]),
    FieldSpec {
        name: "areaImages",
        kind: FieldKind::ImageMap,
        candidates: &["imageDetails.areaImages", "images.areaImages", "areaImages"],
    },
];

/// A resolved canonical value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    NotAvailable,
    Images(Vec<Value>),
    ImageGroups(BTreeMap<String, Vec<Value>>),
}

/// The flat, canonical view of a valuation record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    fields: BTreeMap<&'static str, FieldValue>,
}

impl CanonicalRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Display text of a field, the not-available marker when unresolved.
    pub fn text(&self, name: &str) -> &str {
        match self.fields.get(name) {
            Some(FieldValue::Text(text)) => text,
            _ => NOT_AVAILABLE,
        }
    }

    pub fn has_text(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(FieldValue::Text(_)))
    }

    /// Numeric value of a text field, if it parses as an amount.
    pub fn amount(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(FieldValue::Text(text)) => formatter::parse_amount(text),
            _ => None,
        }
    }

    pub fn images(&self, name: &str) -> &[Value] {
        match self.fields.get(name) {
            Some(FieldValue::Images(list)) => list,
            _ => &[],
        }
    }

    pub fn image_groups(&self, name: &str) -> Option<&BTreeMap<String, Vec<Value>>> {
        match self.fields.get(name) {
            Some(FieldValue::ImageGroups(groups)) => Some(groups),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The record as one flat JSON object keyed by canonical field name.
    pub fn to_flat(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            let json = match value {
                FieldValue::Text(text) => Value::String(text.clone()),
                FieldValue::NotAvailable => Value::String(NOT_AVAILABLE.to_string()),
                FieldValue::Images(list) => Value::Array(list.clone()),
                FieldValue::ImageGroups(groups) => Value::Object(
                    groups
                        .iter()
                        .map(|(area, list)| (area.clone(), Value::Array(list.clone())))
                        .collect(),
                ),
            };
            map.insert((*name).to_string(), json);
        }
        Value::Object(map)
    }
}

/// Resolves a raw record into its canonical form. Never fails.
pub fn resolve(raw: &Value) -> CanonicalRecord {
    let overrides = raw.get(FORM_OVERRIDES_KEY).filter(|v| v.is_object());
    let mut fields = BTreeMap::new();
    let mut unresolved = 0usize;

    for spec in FIELDS {
        let value = resolve_field(raw, overrides, spec);
        if value == FieldValue::NotAvailable {
            unresolved += 1;
        }
        fields.insert(spec.name, value);
    }

    debug!(
        "Resolved {} canonical fields ({} not available).",
        fields.len(),
        unresolved
    );
    CanonicalRecord { fields }
}

fn resolve_field(raw: &Value, overrides: Option<&Value>, spec: &FieldSpec) -> FieldValue {
    let override_value = overrides.and_then(|o| o.get(spec.name));
    let declared = spec
        .candidates
        .iter()
        .map(|path| record::get_path(raw, path).filled());

    // Overrides lead for plain fields and trail for image fields, so an image
    // list already resolved elsewhere is never replaced by the form copy.
    let ordered: Vec<Option<&Value>> = if spec.kind.is_image() {
        declared.chain(std::iter::once(override_value)).collect()
    } else {
        std::iter::once(override_value).chain(declared).collect()
    };

    let resolved = ordered
        .into_iter()
        .flatten()
        .find_map(|value| convert(spec.kind, value));

    match (resolved, spec.kind) {
        (Some(value), _) => value,
        (None, FieldKind::ImageList) => FieldValue::Images(Vec::new()),
        (None, FieldKind::ImageMap) => FieldValue::ImageGroups(BTreeMap::new()),
        (None, _) => FieldValue::NotAvailable,
    }
}

/// Converts a candidate to the field's kind; `None` means "keep looking".
fn convert(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => record::scalar_text(value)
            .filter(|text| !text.is_empty() && text != NOT_AVAILABLE)
            .map(FieldValue::Text),
        FieldKind::Address => {
            let address = formatter::extract_address(value);
            (!address.is_empty() && address != NOT_AVAILABLE).then_some(FieldValue::Text(address))
        }
        FieldKind::ImageList => match value {
            Value::Array(list) if !list.is_empty() => Some(FieldValue::Images(list.clone())),
            _ => None,
        },
        FieldKind::ImageMap => {
            let groups: BTreeMap<String, Vec<Value>> = value
                .as_object()?
                .iter()
                .filter_map(|(area, list)| match list {
                    Value::Array(items) if !items.is_empty() => Some((area.clone(), items.clone())),
                    _ => None,
                })
                .collect();
            (!groups.is_empty()).then_some(FieldValue::ImageGroups(groups))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    /// Builds the smallest record holding `leaf` at `path`.
    fn nest(path: &str, leaf: Value) -> Value {
        path.rsplit('.').fold(leaf, |inner, segment| match segment.parse::<usize>() {
            Ok(index) => {
                let mut items = vec![Value::Null; index];
                items.push(inner);
                Value::Array(items)
            }
            Err(_) => json!({ segment: inner }),
        })
    }

    fn spec(name: &str) -> &'static FieldSpec {
        FIELDS.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn field_names_are_unique() {
        let names: HashSet<&str> = FIELDS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn every_field_accepts_its_own_flat_name() {
        for spec in FIELDS {
            assert!(
                spec.candidates.contains(&spec.name),
                "{} does not list itself as a candidate",
                spec.name
            );
        }
    }

    #[test]
    fn top_level_aliases_never_shadow_other_canonical_fields() {
        let names: HashSet<&str> = FIELDS.iter().map(|s| s.name).collect();
        for spec in FIELDS {
            for candidate in spec.candidates {
                if !candidate.contains('.') && *candidate != spec.name {
                    assert!(
                        !names.contains(candidate),
                        "{} aliases canonical field {}",
                        spec.name,
                        candidate
                    );
                }
            }
        }
    }

    #[test]
    fn only_populated_candidate_wins_wherever_it_sits() {
        for spec in FIELDS.iter().filter(|s| !s.kind.is_image()) {
            for (k, path) in spec.candidates.iter().enumerate() {
                let expected = format!("value-{k}");
                let record = resolve(&nest(path, json!(expected)));
                assert_eq!(
                    record.text(spec.name),
                    expected,
                    "{} via candidate {}",
                    spec.name,
                    path
                );
            }
        }
    }

    #[test]
    fn empty_candidates_are_skipped() {
        let raw = json!({
            "locationDetails": {"city": ""},
            "city": null,
        });
        assert_eq!(resolve(&raw).get("city"), Some(&FieldValue::NotAvailable));

        let raw = json!({"locationDetails": {"city": "  "}, "city": "Nashik"});
        assert_eq!(resolve(&raw).text("city"), "Nashik");
    }

    #[test]
    fn first_alias_wins_when_several_are_populated() {
        let raw = json!({
            "address": "newest writer",
            "propertyAddress": "older writer",
            "addressForCommunication": "oldest writer",
        });
        assert_eq!(resolve(&raw).text("postalAddress"), "oldest writer");

        let candidates = spec("postalAddress").candidates;
        assert!(candidates.len() >= 4);
    }

    #[test]
    fn address_objects_are_flattened() {
        let raw = json!({"locationDetails": {"postalAddress": {"fullAddress": "Flat 2, Baner, Pune"}}});
        assert_eq!(resolve(&raw).text("postalAddress"), "Flat 2, Baner, Pune");
    }

    #[test]
    fn form_overrides_beat_group_values() {
        let raw = json!({
            "locationDetails": {"city": "Pune"},
            "city": "Mumbai",
            "formData": {"city": "Thane"},
        });
        assert_eq!(resolve(&raw).text("city"), "Thane");
    }

    #[test]
    fn empty_form_overrides_do_not_blank_a_field() {
        let raw = json!({"locationDetails": {"city": "Pune"}, "formData": {"city": ""}});
        assert_eq!(resolve(&raw).text("city"), "Pune");
    }

    #[test]
    fn image_lists_survive_form_overrides() {
        let stored = json!([{"url": "https://cdn/a.jpg"}]);
        let raw = json!({
            "imageDetails": {"propertyImages": stored.clone()},
            "formData": {"propertyImages": [], "locationImages": [{"url": "https://cdn/other.jpg"}]},
        });
        let record = resolve(&raw);
        assert_eq!(record.images("propertyImages"), stored.as_array().unwrap().as_slice());

        let raw = json!({
            "imageDetails": {"propertyImages": stored.clone()},
            "formData": {"propertyImages": [{"url": "https://cdn/replacement.jpg"}]},
        });
        assert_eq!(
            resolve(&raw).images("propertyImages"),
            stored.as_array().unwrap().as_slice()
        );
    }

    #[test]
    fn form_overrides_fill_image_lists_nothing_else_provided() {
        let raw = json!({"formData": {"locationImages": ["https://cdn/map.png"]}});
        assert_eq!(resolve(&raw).images("locationImages"), &[json!("https://cdn/map.png")]);
    }

    #[test]
    fn booleans_resolve_to_yes_no() {
        let raw = json!({"apartmentDetails": {"lift": true}, "parking": false});
        let record = resolve(&raw);
        assert_eq!(record.text("liftAvailable"), "Yes");
        assert_eq!(record.text("parkingAvailable"), "No");
    }

    #[test]
    fn absent_fields_use_kind_defaults() {
        let record = resolve(&json!({}));
        assert_eq!(record.get("fairMarketValue"), Some(&FieldValue::NotAvailable));
        assert_eq!(record.get("propertyImages"), Some(&FieldValue::Images(Vec::new())));
        assert_eq!(record.get("areaImages"), Some(&FieldValue::ImageGroups(BTreeMap::new())));
        assert_eq!(record.len(), FIELDS.len());
    }

    #[test]
    fn malformed_groups_do_not_panic() {
        let raw = json!({
            "locationDetails": "flattened",
            "ownerDetails": {"owners": "not a list"},
            "imageDetails": {"areaImages": ["wrong shape"], "propertyImages": {"url": "x"}},
            "formData": 7,
        });
        let record = resolve(&raw);
        assert_eq!(record.text("city"), NOT_AVAILABLE);
        assert!(record.images("propertyImages").is_empty());
        assert!(record.image_groups("areaImages").unwrap().is_empty());
    }

    #[test]
    fn area_images_keep_non_empty_groups() {
        let raw = json!({"areaImages": {"Kitchen": ["https://cdn/k.jpg"], "Hall": []}});
        let record = resolve(&raw);
        let groups = record.image_groups("areaImages").unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key("Kitchen"));
    }

    #[test]
    fn resolving_a_canonical_record_is_idempotent() {
        let raw = json!({
            "uniqueId": "VAL-0042",
            "ownerDetails": {"clientName": "R. Kulkarni", "owners": [{"name": "R. Kulkarni"}]},
            "locationDetails": {"postalAddress": {"fullAddress": "B-12, Kothrud, Pune"}, "city": "Pune"},
            "apartmentDetails": {"lift": true, "carpetArea": 650},
            "valuationDetails": {"fairMarketValue": 4500000},
            "imageDetails": {
                "propertyImages": [{"url": "https://cdn/p1.jpg"}],
                "areaImages": {"Hall": ["https://cdn/h.jpg"]},
            },
        });
        let first = resolve(&raw);
        let second = resolve(&first.to_flat());
        assert_eq!(first, second);
        assert_eq!(second.text("carpetArea"), "650");
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(
            r#"{"city": "Pune", "locationDetails": {"district": "Pune", "city": "Haveli"}}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"locationDetails": {"city": "Haveli", "district": "Pune"}, "city": "Pune"}"#,
        )
        .unwrap();
        assert_eq!(resolve(&a), resolve(&b));
    }
}
