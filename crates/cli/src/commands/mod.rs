pub mod doctor;
pub mod forge;
pub mod knowledge;
pub mod lessons;
pub mod onboard;
pub mod run;
