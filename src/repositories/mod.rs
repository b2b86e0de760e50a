pub(crate) mod health;
pub(crate) mod material_records;
pub(crate) mod materials;
pub(crate) mod users;
