//! Persistent entities of the certificate service.

pub mod certificate;
pub mod certificate_event;
pub mod company;
pub mod regulator;
pub mod user;
pub mod web3_tx;

pub use certificate::{
    Certificate, CertificateAction, CertificatePatch, CertificateStatus, ChainInfo,
    NewCertificate, Network, StorageInfo, StorageProvider,
};
pub use certificate_event::{Actor, CertificateEvent, EventType, NewCertificateEvent};
pub use company::{Company, NewCompany};
pub use regulator::{NewRegulator, Regulator};
pub use user::{NewUser, User, UserRole};
pub use web3_tx::{NewWeb3Tx, TxPurpose, TxSettlement, TxStatus, Web3Tx};
