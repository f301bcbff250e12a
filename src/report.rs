//! Report Renderer Module
//!
//! Lays a canonical record out as the fixed valuation form: an ordered list of
//! sections made of label/value rows, followed by the image galleries.
//! Derived rows (running totals, amounts in words) are computed here and never
//! written back into the canonical record.

use crate::field_resolver::CanonicalRecord;
use crate::formatter::{self, CURRENCY_SYMBOL};
use crate::record::NOT_AVAILABLE;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::Serialize;
use std::fmt;

pub const REPORT_TITLE: &str = "VALUATION REPORT";

/// Sections that must begin at the top of a fresh page.
pub const FORCED_BREAK_SECTIONS: [&str; 1] = ["valuationDetails"];

/// Line items summed into the total of the valuation details section.
pub const VALUATION_ITEMS: [(&str, &str); 10] = [
    ("presentValueOfFlat", "Present value of the flat"),
    ("wardrobesValue", "Wardrobes"),
    ("showcasesValue", "Showcases"),
    ("kitchenArrangementsValue", "Kitchen arrangements"),
    ("superfineFinishValue", "Superfine finish"),
    ("interiorDecorationsValue", "Interior decorations"),
    ("electricityDepositsValue", "Electricity deposits / electrical fittings"),
    ("collapsibleGatesValue", "Extra collapsible gates / grill works"),
    ("potentialValue", "Potential value, if any"),
    ("otherItemsValue", "Others"),
];

/// Headline values, each paired with `<name>Words`.
pub const VALUE_PAIRS: [(&str, &str); 6] = [
    ("fairMarketValue", "Fair market value"),
    ("realizableValue", "Realizable value"),
    ("distressValue", "Distress sale value"),
    ("agreementValue", "Agreement / sale deed value"),
    ("circleRateValue", "Guideline (circle rate) value"),
    ("insurableValue", "Insurable value"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    /// Part of the continuously flowing region that gets paginated.
    Flow,
    /// Rendered on its own as a discrete page.
    FullPage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: Option<String>,
    pub label: String,
    pub value: String,
    pub emphasis: bool,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub id: &'static str,
    pub title: String,
    pub layout: SectionLayout,
    pub forced_break: bool,
    pub rows: Vec<Row>,
}

impl Section {
    fn new(id: &'static str, title: &str, layout: SectionLayout) -> Self {
        Section {
            id,
            title: title.to_string(),
            layout,
            forced_break: FORCED_BREAK_SECTIONS.contains(&id),
            rows: Vec::new(),
        }
    }

    /// Appends a numbered row.
    fn row(&mut self, label: &str, value: impl Into<String>) -> &mut Self {
        let index = self.rows.iter().filter(|r| r.index.is_some()).count() + 1;
        self.rows.push(Row {
            index: Some(index.to_string()),
            label: label.to_string(),
            value: value.into(),
            emphasis: false,
        });
        self
    }

    /// Appends an unnumbered continuation row.
    fn detail(&mut self, label: &str, value: impl Into<String>) -> &mut Self {
        self.rows.push(Row {
            index: None,
            label: label.to_string(),
            value: value.into(),
            emphasis: false,
        });
        self
    }

    fn emphasized(&mut self, label: &str, value: impl Into<String>) -> &mut Self {
        self.rows.push(Row {
            index: None,
            label: label.to_string(),
            value: value.into(),
            emphasis: true,
        });
        self
    }

    pub fn row_value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryLayout {
    /// Two columns by three rows per page.
    Grid,
    /// One large image per page.
    Single,
}

#[derive(Debug, Clone)]
pub struct Gallery {
    pub title: String,
    pub layout: GalleryLayout,
    /// Image URLs that passed validation.
    pub urls: Vec<String>,
}

/// A numeric amount and its words.
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyValue {
    pub amount: f64,
    pub words: String,
}

impl MoneyValue {
    /// Reads `value_field`, keeping supplied words and synthesizing missing ones.
    pub fn from_record(record: &CanonicalRecord, value_field: &str, words_field: &str) -> Option<Self> {
        let amount = record.amount(value_field)?;
        let words = if record.has_text(words_field) {
            record.text(words_field).to_string()
        } else {
            formatter::money_in_words(amount)
        };
        Some(MoneyValue { amount, words })
    }

    pub fn figures(&self) -> String {
        format!(
            "{} {}/-",
            CURRENCY_SYMBOL,
            formatter::format_indian_number(self.amount.round() as i64)
        )
    }
}

/// Summary of a rendered report, written next to the output on request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIndex {
    pub title: String,
    pub client_label: String,
    pub generated_at: String,
    pub sections: Vec<SectionEntry>,
    pub galleries: Vec<GalleryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionEntry {
    pub id: &'static str,
    pub title: String,
    pub rows: usize,
    pub full_page: bool,
    pub forced_break: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    pub title: String,
    pub images: usize,
}

/// The rendered report, ready for rasterization.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub title: String,
    /// Client name, or the record id when no client is recorded.
    pub client_label: String,
    pub sections: Vec<Section>,
    pub galleries: Vec<Gallery>,
}

impl ReportDocument {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn flow_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.layout == SectionLayout::Flow)
    }

    pub fn full_page_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(|s| s.layout == SectionLayout::FullPage)
    }

    pub fn image_count(&self) -> usize {
        self.galleries.iter().map(|g| g.urls.len()).sum()
    }

    pub fn index(&self, generated_at: DateTime<Utc>) -> ReportIndex {
        ReportIndex {
            title: self.title.clone(),
            client_label: self.client_label.clone(),
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            sections: self
                .sections
                .iter()
                .map(|s| SectionEntry {
                    id: s.id,
                    title: s.title.clone(),
                    rows: s.rows.len(),
                    full_page: s.layout == SectionLayout::FullPage,
                    forced_break: s.forced_break,
                })
                .collect(),
            galleries: self
                .galleries
                .iter()
                .map(|g| GalleryEntry {
                    title: g.title.clone(),
                    images: g.urls.len(),
                })
                .collect(),
            page_count: None,
        }
    }

    /// HTML table markup of the report, used for the preview output.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_html(&mut html);
        html
    }

    /// Writes the HTML preview of the report into `html`.
    pub fn write_html(&self, html: &mut impl fmt::Write) -> fmt::Result {
        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html><head><meta charset=\"utf-8\">")?;
        writeln!(html, "<title>{} - {}</title>", escape_html(&self.title), escape_html(&self.client_label))?;
        writeln!(html, "<style>table{{width:100%;border-collapse:collapse}}td,th{{border:1px solid #000;padding:4px;vertical-align:top}}th{{background:#ddd;text-align:left}}.break{{page-break-before:always}}.gallery img{{max-width:48%;margin:1%}}</style>")?;
        writeln!(html, "</head><body>")?;
        writeln!(html, "<h1>{}</h1>", escape_html(&self.title))?;

        for section in &self.sections {
            let class = if section.forced_break || section.layout == SectionLayout::FullPage {
                " class=\"break\""
            } else {
                ""
            };
            writeln!(html, "<table id=\"{}\"{}>", section.id, class)?;
            writeln!(html, "<tr><th colspan=\"3\">{}</th></tr>", escape_html(&section.title))?;
            for row in &section.rows {
                let (open, close) = if row.emphasis { ("<b>", "</b>") } else { ("", "") };
                writeln!(
                    html,
                    "<tr><td>{}</td><td>{open}{}{close}</td><td>{open}{}{close}</td></tr>",
                    escape_html(row.index.as_deref().unwrap_or("")),
                    escape_html(&row.label),
                    escape_html(&row.value),
                )?;
            }
            writeln!(html, "</table>")?;
        }

        for gallery in &self.galleries {
            writeln!(html, "<div class=\"gallery break\"><h2>{}</h2>", escape_html(&gallery.title))?;
            for url in &gallery.urls {
                writeln!(html, "<img src=\"{}\">", escape_attr(url))?;
            }
            writeln!(html, "</div>")?;
        }

        writeln!(html, "</body></html>")
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

/// Renders the fixed report layout for a canonical record.
pub fn render(record: &CanonicalRecord) -> ReportDocument {
    let sections = vec![
        general_section(record),
        property_section(record),
        apartment_section(record),
        locality_section(record),
        valuation_details_section(record),
        market_value_section(record),
        declaration_section(record),
        remarks_section(record),
    ];
    let galleries = galleries(record);

    let client_label = [record.text("clientName"), record.text("uniqueId")]
        .into_iter()
        .find(|s| *s != NOT_AVAILABLE)
        .unwrap_or("report")
        .to_string();

    debug!(
        "Rendered {} sections and {} galleries for '{}'.",
        sections.len(),
        galleries.len(),
        client_label
    );

    ReportDocument {
        title: REPORT_TITLE.to_string(),
        client_label,
        sections,
        galleries,
    }
}

fn date(record: &CanonicalRecord, field: &str) -> String {
    let value = record.text(field);
    formatter::format_date(Some(value))
}

/// Amount in figures when it parses, the stored text otherwise.
fn money(record: &CanonicalRecord, field: &str) -> String {
    match record.amount(field) {
        Some(amount) => MoneyValue { amount, words: String::new() }.figures(),
        None => record.text(field).to_string(),
    }
}

fn general_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("general", "I. GENERAL", SectionLayout::Flow);
    s.row("Report reference", record.text("uniqueId"))
        .row("Purpose for which valuation is made", record.text("purposeOfValuation"))
        .row("Name of the bank / branch", format!("{} / {}", record.text("bankName"), record.text("branchName")))
        .row("Application / loan account no.", record.text("applicationNo"))
        .row("Date of inspection", date(record, "dateOfInspection"))
        .row("Date on which valuation is made", date(record, "dateOfValuation"))
        .row("Date of report", date(record, "reportDate"))
        .row("Name of the client", record.text("clientName"))
        .row("Name of the owner(s)", record.text("ownerName"))
        .row("Address of the owner(s)", record.text("ownerAddress"))
        .row("Contact number", record.text("ownerPhone"))
        .row("Person met at site", record.text("personMetAtSite"))
        .row("Inspected by", record.text("engineerName"))
        .row("List of documents produced for perusal", record.text("listOfDocuments"))
        .detail("Agreement for sale", record.text("agreementForSale"))
        .detail("Commencement certificate", record.text("commencementCertificate"))
        .detail("Occupancy certificate", record.text("occupancyCertificate"))
        .detail("Approved plan", record.text("approvedPlan"))
        .detail("Approving authority", record.text("approvedPlanAuthority"))
        .detail("Deviations from the approved plan", record.text("deviationsFromPlan"));
    s
}

fn property_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("property", "II. PROPERTY DESCRIPTION", SectionLayout::Flow);
    s.row("Postal address of the property", record.text("postalAddress"))
        .row("City / Town", record.text("city"))
        .row("CTS / survey no.", record.text("apartmentCTSNo"))
        .row("Plot no. / sector no.", format!("{} / {}", record.text("plotNo"), record.text("sectorNo")))
        .row("Village / ward", format!("{} / {}", record.text("village"), record.text("wardNo")))
        .row("Taluka / district", format!("{} / {}", record.text("taluka"), record.text("district")))
        .row("State / PIN code", format!("{} / {}", record.text("state"), record.text("pinCode")))
        .row("Landmark", record.text("landmark"))
        .row("Coordinates (lat, long)", format!("{}, {}", record.text("latitude"), record.text("longitude")))
        .row("Municipal corporation / local authority", record.text("municipalCorporation"))
        .row("Residential / commercial / mixed area", record.text("areaClassification"))
        .row("Classification of locality", record.text("classificationOfLocality"))
        .row("Type of property", record.text("propertyType"))
        .row("Occupied by owner / tenant", record.text("occupancyStatus"))
        .detail("Name of tenant", record.text("tenantName"))
        .detail("Monthly rent", money(record, "monthlyRent"))
        .row("Boundaries of the property", "")
        .detail("North", record.text("boundaryNorth"))
        .detail("South", record.text("boundarySouth"))
        .detail("East", record.text("boundaryEast"))
        .detail("West", record.text("boundaryWest"));
    s
}

fn apartment_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("apartment", "III. APARTMENT BUILDING", SectionLayout::Flow);
    s.row("Name of the building / project", record.text("buildingName"))
        .row("Name of the society", record.text("societyName"))
        .row("Flat no. / floor", format!("{} / {}", record.text("flatNo"), record.text("floorOfFlat")))
        .row("Number of floors in the building", record.text("numberOfFloors"))
        .row("Number of flats on the floor", record.text("numberOfFlatsOnFloor"))
        .row("Year of construction", record.text("yearOfConstruction"))
        .row("Age of the building", record.text("ageOfBuilding"))
        .row("Estimated residual life", record.text("residualLife"))
        .row("Type of structure", record.text("typeOfStructure"))
        .row("Carpet area (sq. ft.)", record.text("carpetArea"))
        .row("Built-up area (sq. ft.)", record.text("builtUpArea"))
        .row("Saleable area (sq. ft.)", record.text("superBuiltUpArea"))
        .row("Undivided share of land", record.text("undividedLandShare"))
        .row("Lift", record.text("liftAvailable"))
        .row("Parking", record.text("parkingAvailable"))
        .row("Water supply", record.text("waterSupply"))
        .row("Electricity supply", record.text("electricitySupply"))
        .row("Sewerage system", record.text("sewerageSystem"))
        .row("Specifications", "")
        .detail("Flooring", record.text("flooring"))
        .detail("Doors", record.text("doors"))
        .detail("Windows", record.text("windows"))
        .detail("Roof", record.text("roof"))
        .detail("Fittings", record.text("fittings"))
        .row("Quality of construction", record.text("qualityOfConstruction"))
        .row("Appearance of the building", record.text("appearanceOfBuilding"))
        .row("Maintenance of the building", record.text("maintenanceOfBuilding"))
        .row("Amenities", record.text("amenities"));
    s
}

fn locality_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("locality", "IV. LOCALITY AND MARKETABILITY", SectionLayout::Flow);
    s.row("Nearest railway station", record.text("distanceFromRailwayStation"))
        .row("Nearest bus stop", record.text("distanceFromBusStop"))
        .row("Distance from city centre", record.text("distanceFromCityCentre"))
        .row("Nearby hospital", record.text("nearbyHospital"))
        .row("Nearby school", record.text("nearbySchool"))
        .row("Civic amenities", record.text("civicAmenities"))
        .row("Width of approach road", record.text("roadWidth"))
        .row("Flood prone area", record.text("floodProneArea"))
        .row("Land use / zoning", record.text("landUse"))
        .row("Marketability", record.text("marketability"))
        .row("Demand and supply", record.text("demandSupply"))
        .row("Prevailing market rate (per sq. ft.)", money(record, "ratePerSqft"))
        .row("Guideline rate (per sq. ft.)", money(record, "guidelineRate"))
        .row("Composite rate after depreciation", money(record, "compositeRate"))
        .detail("Depreciation", record.text("depreciationPercent"))
        .detail("Depreciated rate", money(record, "depreciatedRate"))
        .detail("Replacement cost", money(record, "replacementCost"))
        .row("Comparable sale instances", record.text("comparableSales"));
    s
}

/// Sum of the valuation line items, or `None` when none carries a value.
///
/// The sum is rounded once, half away from zero, so the figures and the
/// words are derived from the same integer.
pub fn valuation_items_total(record: &CanonicalRecord) -> Option<f64> {
    let amounts: Vec<f64> = VALUATION_ITEMS
        .iter()
        .filter_map(|(field, _)| record.amount(field))
        .collect();
    if amounts.iter().all(|a| *a == 0.0) {
        return None;
    }
    Some(amounts.iter().sum::<f64>().round())
}

fn valuation_details_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("valuationDetails", "V. DETAILS OF VALUATION", SectionLayout::Flow);
    for (field, label) in VALUATION_ITEMS {
        s.row(label, money(record, field));
    }

    if let Some(total) = valuation_items_total(record) {
        let words = if record.has_text("totalValuationItemsWords") {
            record.text("totalValuationItemsWords").to_string()
        } else {
            formatter::money_in_words(total)
        };
        let total = MoneyValue { amount: total, words };
        s.emphasized("Total", total.figures())
            .emphasized("Total in words", total.words);
    }
    s
}

fn market_value_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("marketValue", "VI. VALUE OF THE PROPERTY", SectionLayout::Flow);
    for (field, label) in VALUE_PAIRS {
        let words_field = format!("{field}Words");
        match MoneyValue::from_record(record, field, &words_field) {
            Some(value) => {
                s.row(label, value.figures()).detail("In words", value.words);
            }
            None => {
                s.row(label, record.text(field))
                    .detail("In words", record.text(&words_field));
            }
        }
    }

    let rounded = formatter::round_to_nearest_1000(Some(record.text("fairMarketValue")));
    s.emphasized(
        "Fair market value (rounded off)",
        formatter::format_currency_words(&rounded, 100.0),
    );
    s
}

fn declaration_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("declaration", "VII. DECLARATION", SectionLayout::FullPage);
    s.row("The information furnished in this report is true and correct to the best of my knowledge and belief.", "")
        .row("I have no direct or indirect interest in the property valued.", "")
        .row(
            &format!("I have personally inspected the property on {}.", date(record, "dateOfInspection")),
            "",
        )
        .row("I have not been convicted of any offence and sentenced to imprisonment.", "")
        .row("I have not been found guilty of misconduct in my professional capacity.", "")
        .detail("Place", record.text("placeOfValuation"))
        .detail("Date", date(record, "reportDate"))
        .detail("Name of the valuer", record.text("valuerName"))
        .detail("Qualification", record.text("valuerQualification"))
        .detail("Registration no.", record.text("valuerRegistrationNo"));
    s
}

fn remarks_section(record: &CanonicalRecord) -> Section {
    let mut s = Section::new("remarks", "VIII. REMARKS AND ENCLOSURES", SectionLayout::FullPage);
    s.row("Remarks", record.text("remarks"))
        .row("Enclosures", record.text("enclosures"))
        .row("Status", record.text("status"));
    if record.has_text("managerFeedback") {
        s.row("Manager feedback", record.text("managerFeedback"));
    }
    s
}

fn valid_urls(refs: &[serde_json::Value]) -> Vec<String> {
    refs.iter()
        .map(formatter::extract_image_url)
        .filter(|url| !url.is_empty())
        .collect()
}

fn galleries(record: &CanonicalRecord) -> Vec<Gallery> {
    let mut galleries = Vec::new();
    let mut push = |title: String, layout: GalleryLayout, urls: Vec<String>| {
        if !urls.is_empty() {
            galleries.push(Gallery { title, layout, urls });
        }
    };

    push(
        "PHOTOGRAPHS OF THE PROPERTY".to_string(),
        GalleryLayout::Grid,
        valid_urls(record.images("propertyImages")),
    );
    if let Some(groups) = record.image_groups("areaImages") {
        for (area, refs) in groups {
            push(
                format!("PHOTOGRAPHS: {}", area.to_uppercase()),
                GalleryLayout::Grid,
                valid_urls(refs),
            );
        }
    }
    push(
        "LOCATION MAP".to_string(),
        GalleryLayout::Single,
        valid_urls(record.images("locationImages")),
    );
    push(
        "DOCUMENTS".to_string(),
        GalleryLayout::Single,
        valid_urls(record.images("documentImages")),
    );
    galleries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_resolver::resolve;
    use serde_json::json;

    #[test]
    fn sections_come_in_fixed_order() {
        let report = render(&resolve(&json!({})));
        let ids: Vec<&str> = report.sections.iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            [
                "general",
                "property",
                "apartment",
                "locality",
                "valuationDetails",
                "marketValue",
                "declaration",
                "remarks"
            ]
        );
        assert!(report.section("valuationDetails").unwrap().forced_break);
        assert_eq!(report.full_page_sections().count(), 2);
        assert_eq!(report.client_label, "report");
    }

    #[test]
    fn total_row_sums_line_items() {
        let record = resolve(&json!({
            "presentValueOfFlat": "4500000",
            "wardrobesValue": 50000,
            "kitchenArrangementsValue": "₹ 25,000/-",
        }));
        let report = render(&record);
        let details = report.section("valuationDetails").unwrap();
        assert_eq!(details.row_value("Total"), Some("₹ 45,75,000/-"));
        assert_eq!(
            details.row_value("Total in words"),
            Some("FORTY FIVE LAC SEVENTY FIVE THOUSAND")
        );
    }

    #[test]
    fn total_row_skipped_when_items_absent_or_zero() {
        let record = resolve(&json!({"wardrobesValue": 0, "showcasesValue": "0"}));
        let details = render(&record).section("valuationDetails").unwrap().clone();
        assert_eq!(details.row_value("Total"), None);
        assert_eq!(details.rows.len(), VALUATION_ITEMS.len());
    }

    #[test]
    fn total_rounds_once_after_summing() {
        let record = resolve(&json!({"wardrobesValue": 1000.4, "showcasesValue": 1000.4}));
        let details = render(&record).section("valuationDetails").unwrap().clone();
        assert_eq!(details.row_value("Total"), Some("₹ 2,001/-"));
        assert_eq!(details.row_value("Total in words"), Some("TWO THOUSAND ONE"));
    }

    #[test]
    fn market_value_accepts_rupee_abbreviation() {
        let record = resolve(&json!({"fairMarketValue": "Rs. 15,00,000"}));
        let market = render(&record).section("marketValue").unwrap().clone();
        assert_eq!(market.row_value("Fair market value"), Some("₹ 15,00,000/-"));
        assert_eq!(market.row_value("In words"), Some("FIFTEEN LAC"));
        assert_eq!(
            market.row_value("Fair market value (rounded off)"),
            Some("₹ 15,00,000/- (FIFTEEN LAC)")
        );
    }

    #[test]
    fn supplied_total_words_are_kept() {
        let record = resolve(&json!({
            "presentValueOfFlat": 100000,
            "totalValuationItemsWords": "RUPEES ONE LAC ONLY",
        }));
        let details = render(&record).section("valuationDetails").unwrap().clone();
        assert_eq!(details.row_value("Total in words"), Some("RUPEES ONE LAC ONLY"));
    }

    #[test]
    fn value_words_synthesized_only_when_missing() {
        let record = resolve(&json!({
            "fairMarketValue": 1500000,
            "distressValue": 1200000,
            "distressValueWords": "TWELVE LAKH ONLY",
        }));
        let market = render(&record).section("marketValue").unwrap().clone();
        let rows: Vec<(&str, &str)> = market
            .rows
            .iter()
            .map(|r| (r.label.as_str(), r.value.as_str()))
            .collect();

        let fmv = rows.iter().position(|r| r.0 == "Fair market value").unwrap();
        assert_eq!(rows[fmv].1, "₹ 15,00,000/-");
        assert_eq!(rows[fmv + 1], ("In words", "FIFTEEN LAC"));

        let distress = rows.iter().position(|r| r.0 == "Distress sale value").unwrap();
        assert_eq!(rows[distress + 1], ("In words", "TWELVE LAKH ONLY"));

        let insurable = rows.iter().position(|r| r.0 == "Insurable value").unwrap();
        assert_eq!(rows[insurable], ("Insurable value", "N/A"));
        assert_eq!(rows[insurable + 1], ("In words", "N/A"));

        assert_eq!(
            market.row_value("Fair market value (rounded off)"),
            Some("₹ 15,00,000/- (FIFTEEN LAC)")
        );
    }

    #[test]
    fn zero_value_is_spelled_out() {
        let record = resolve(&json!({"agreementValue": 0}));
        let market = render(&record).section("marketValue").unwrap().clone();
        let i = market
            .rows
            .iter()
            .position(|r| r.label == "Agreement / sale deed value")
            .unwrap();
        assert_eq!(market.rows[i].value, "₹ 0/-");
        assert_eq!(market.rows[i + 1].value, "ZERO");
    }

    #[test]
    fn galleries_skip_empty_and_invalid_images() {
        let record = resolve(&json!({
            "imageDetails": {
                "propertyImages": [{"url": "https://cdn/p1.jpg"}, {"url": "ftp://cdn/p2.jpg"}, ""],
                "locationImages": [{"src": "not-a-url"}],
                "areaImages": {"Kitchen": [{"url": "https://cdn/k.jpg"}], "Hall": [{"url": "bad"}]},
            },
            "documentImages": ["data:image/png;base64,AAAA"],
        }));
        let report = render(&record);
        let titles: Vec<&str> = report.galleries.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(
            titles,
            ["PHOTOGRAPHS OF THE PROPERTY", "PHOTOGRAPHS: KITCHEN", "DOCUMENTS"]
        );
        assert_eq!(report.galleries[0].urls, ["https://cdn/p1.jpg"]);
        assert_eq!(report.galleries[2].layout, GalleryLayout::Single);
        assert_eq!(report.image_count(), 3);
    }

    #[test]
    fn dates_are_formatted_in_rows() {
        let record = resolve(&json!({"dateOfInspection": "2024-03-05", "clientName": "A & B"}));
        let report = render(&record);
        let general = report.section("general").unwrap();
        assert_eq!(general.row_value("Date of inspection"), Some("5/3/2024"));
        assert_eq!(report.client_label, "A & B");
        assert!(report.to_html().contains("A &amp; B"));
    }

    #[test]
    fn html_preview_marks_page_breaks_and_galleries() {
        let record = resolve(&json!({
            "clientName": "R <Shah>",
            "propertyImages": ["https://cdn/p1.jpg?a=1&b=\"2\""],
        }));
        let report = render(&record);
        let mut html = String::new();
        report.write_html(&mut html).unwrap();

        assert_eq!(html, report.to_html());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.trim_end().ends_with("</body></html>"));
        assert!(html.contains("<title>VALUATION REPORT - R &lt;Shah&gt;</title>"));
        assert!(html.contains("<table id=\"valuationDetails\" class=\"break\">"));
        assert!(html.contains("<table id=\"general\">"));
        assert!(html.contains("<img src=\"https://cdn/p1.jpg?a=1&amp;b=&quot;2&quot;\">"));
    }

    #[test]
    fn index_summarizes_sections_and_galleries() {
        let record = resolve(&json!({"clientName": "Asha", "propertyImages": ["https://cdn/p1.jpg", "bad"]}));
        let generated_at = DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z").unwrap().with_timezone(&Utc);
        let index = render(&record).index(generated_at);

        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["clientLabel"], "Asha");
        assert_eq!(value["generatedAt"], "2024-03-05T10:00:00Z");
        assert_eq!(value["sections"].as_array().unwrap().len(), 8);
        assert_eq!(value["sections"][4]["forcedBreak"], true);
        assert_eq!(value["sections"][7]["fullPage"], true);
        assert_eq!(value["galleries"][0]["images"], 1);
        assert!(value.get("pageCount").is_none());
    }

    #[test]
    fn rendering_leaves_the_record_untouched() {
        let record = resolve(&json!({"presentValueOfFlat": 100000}));
        let before = record.clone();
        let _ = render(&record);
        assert_eq!(record, before);
        assert_eq!(record.get("totalValuationItemsWords"), before.get("totalValuationItemsWords"));
    }
}
