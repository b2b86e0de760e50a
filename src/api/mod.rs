pub(crate) mod bonus;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod materials;
pub(crate) mod router;
