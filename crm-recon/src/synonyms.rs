//! Declared field-name synonym lists
//!
//! Legacy exports name the same field many ways. Every lookup into a
//! heterogeneous row goes through one of these ordered lists: earlier names
//! win. Lists are compared case-insensitively (the row accessor lowercases
//! keys) and matched exactly, never by substring.
//!
//! When a new export shows up with a header not listed here, add the header
//! to the matching list and bump [`SYNONYM_SET_VERSION`] so run summaries show
//! which vocabulary produced them.

/// Version of the synonym vocabulary, reported in run summaries
pub const SYNONYM_SET_VERSION: u32 = 1;

/// Table-name hints for the legacy relational schema
pub mod tables {
    pub const CUSTOMERS: &[&str] = &["customers", "customer"];
    pub const VEHICLES: &[&str] = &["vehicles", "vehicle"];
}

/// Legacy `customers` table columns
pub mod customer {
    pub const ID: &[&str] = &["id", "customerid", "customer_id", "legacy_customer_id", "externalclientid"];
    pub const FIRST_NAME: &[&str] = &["first_name", "firstname", "first"];
    pub const LAST_NAME: &[&str] = &["last_name", "lastname", "last"];
    pub const FULL_NAME: &[&str] = &["name", "fullname", "customername", "customer_name"];
    pub const BUSINESS_NAME: &[&str] = &["business_name", "business", "company", "company_name"];
    pub const PHONE: &[&str] = &[
        "phone",
        "phone_number",
        "phonenumber",
        "primary_phone",
        "primaryphone",
        "mobile",
        "cell",
    ];
    pub const EMAIL: &[&str] = &["email", "email_address", "emailaddress"];
    pub const ADDRESS1: &[&str] = &["address1", "address_1", "street", "street1", "line1", "address"];
    pub const ADDRESS2: &[&str] = &["address2", "address_2", "street2", "line2", "suite", "apt", "apartment"];
    pub const CITY: &[&str] = &["city", "town"];
    pub const STATE: &[&str] = &["state", "state_province", "province", "region"];
    pub const ZIP: &[&str] = &["zip", "zipcode", "postal", "postal_code", "postalcode", "zip_code"];
    pub const NOTES: &[&str] = &["notes", "note", "comments", "comment"];
    pub const IS_DEALER: &[&str] = &["is_dealer", "dealer"];
    pub const DEALER_LEVEL: &[&str] = &["dealer_level", "tier", "level"];
    pub const CREATED_AT: &[&str] = &["created_at", "createdat", "created", "created_on", "created_date"];
    pub const UPDATED_AT: &[&str] = &["updated_at", "updatedat", "updated", "updated_on", "modified_at"];
}

/// Legacy `vehicles` table columns
pub mod vehicle {
    pub const OWNER: &[&str] = &["customer_id", "customerid", "customer", "customer_id_fk", "owner_id"];
    pub const ID: &[&str] = &["id", "vehicleid", "vehicle_id", "legacy_vehicle_id"];
    pub const YEAR: &[&str] = &["year", "vehicleyear", "vehicle_year"];
    pub const MAKE: &[&str] = &["make", "vehiclemake", "vehicle_make"];
    pub const MODEL: &[&str] = &["model", "vehiclemodel", "vehicle_model"];
    pub const TRIM: &[&str] = &["trim"];
    pub const COLOR: &[&str] = &["color", "paint"];
    pub const PLATE: &[&str] = &["plate", "license_plate", "licenseplate"];
    pub const VIN: &[&str] = &["vin", "vinnumber", "vehicle_vin"];
    pub const MILEAGE: &[&str] = &["mileage", "miles", "odometer"];
    pub const NOTES: &[&str] = &["notes", "note", "comments", "comment"];
    pub const CREATED_AT: &[&str] = super::customer::CREATED_AT;
    pub const UPDATED_AT: &[&str] = super::customer::UPDATED_AT;
}

/// Customer spreadsheet export headers
pub mod spreadsheet {
    pub const CLIENT_ID: &[&str] = &["client id", "clientid", "client_id"];
    pub const LEAD_ID: &[&str] = &["lead id", "leadid", "lead_id"];
    pub const FIRST_NAME: &[&str] = &["first name", "first_name", "firstname"];
    pub const LAST_NAME: &[&str] = &["last name", "last_name", "lastname"];
    pub const FULL_NAME: &[&str] = &["name", "full name", "customer name"];
    pub const EMAIL: &[&str] = &["email", "email address"];
    pub const PHONE: &[&str] = &["phone", "phone number", "mobile", "cell"];
    pub const COMPANY: &[&str] = &["company"];
    pub const BUSINESS_NAME: &[&str] = &["company", "business name"];
    pub const ADDRESS1: &[&str] = &["address", "address 1", "address1"];
    pub const ADDRESS2: &[&str] = &["address 2", "address2"];
    pub const CITY: &[&str] = &["city"];
    pub const STATE: &[&str] = &["state/province", "state", "province"];
    pub const ZIP: &[&str] = &["zip/postal code", "zip", "postal code"];
    pub const COUNTRY: &[&str] = &["country"];
    pub const NOTES: &[&str] = &["notes"];
    pub const TAGS: &[&str] = &["tags"];
    pub const SOURCE: &[&str] = &["source"];
    pub const VIN: &[&str] = &["vin"];
    pub const YEAR: &[&str] = &["year"];
    pub const MAKE: &[&str] = &["make"];
    pub const MODEL: &[&str] = &["model"];
    pub const TRIM: &[&str] = &["trim"];
    pub const ODOMETER: &[&str] = &["odometer", "mileage"];
    pub const PLATE: &[&str] = &["plate", "license plate"];
    pub const COLOR: &[&str] = &["color"];
    pub const VEHICLE_NOTES: &[&str] = &["vehicle notes"];
}

/// Calendar export headers
pub mod calendar {
    pub const DATE: &[&str] = &["start", "event date", "date", "start time"];
    pub const TITLE: &[&str] = &["title", "subject", "summary", "event"];
    pub const DESCRIPTION: &[&str] = &["description", "notes", "details", "body"];
    pub const EVENT_ID: &[&str] = &["event id", "id", "legacy event id"];
    pub const PHONE: &[&str] = &["phone", "customer phone", "customer contact", "contact"];
    pub const NAME: &[&str] = &["name", "customer", "client", "customer name", "full name"];
    pub const VIN: &[&str] = &["vin"];
    pub const SERVICES: &[&str] = &["services", "service"];
    pub const OTHER_TEXT: &[&str] = &["location", "comments"];
}
