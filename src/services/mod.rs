pub(crate) mod bonus;
pub(crate) mod extraction;
pub(crate) mod files;
pub(crate) mod review;
pub(crate) mod storage;
