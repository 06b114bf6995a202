mod error;
pub mod family;
mod glm;
mod irls;
mod link;
mod predictor;
mod response;

pub use crate::{
    error::*,
    family::Family,
    glm::*,
    irls::*,
    link::*,
    predictor::{DensePredChol, DensePredQr, LinPred},
    response::*,
};
