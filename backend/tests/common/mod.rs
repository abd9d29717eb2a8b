//! Shared fixtures for the workflow scenario tests

#![allow(dead_code)]

use std::sync::Arc;

use material_qms_backend::config::WorkflowConfig;
use material_qms_backend::services::{
    GateEntryService, GrnService, NotificationService, QualitySampleService, QualityTestService,
    WorklistService,
};
use material_qms_backend::store::{MemoryWorkflowStore, WorkflowStore};
use rust_decimal::Decimal;
use shared::{
    Actor, AssignSampleInput, CreateGateEntryInput, CreateGrnInput, GateEntry, GoodsReceiptNote,
    GrnItemInput, QualitySample, QualityTest, RequestSamplingInput, Role, UserRecord,
};

pub struct Plant {
    pub memory: Arc<MemoryWorkflowStore>,
    pub gate: GateEntryService,
    pub grns: GrnService,
    pub samples: QualitySampleService,
    pub tests: QualityTestService,
    pub worklists: WorklistService,
    pub inbox: NotificationService,
}

impl Plant {
    pub fn new() -> Self {
        let memory = Arc::new(MemoryWorkflowStore::with_demo_directory());
        let store: Arc<dyn WorkflowStore> = memory.clone();
        Self {
            gate: GateEntryService::new(store.clone()),
            grns: GrnService::new(store.clone()),
            samples: QualitySampleService::new(store.clone(), WorkflowConfig::default()),
            tests: QualityTestService::new(store.clone()),
            worklists: WorklistService::new(store.clone()),
            inbox: NotificationService::new(store),
            memory,
        }
    }

    pub async fn gate_entry(&self) -> GateEntry {
        self.gate
            .create_gate_entry(&security(), gate_entry_input("Lactose", 500))
            .await
            .unwrap()
    }

    pub async fn received(&self) -> (GateEntry, GoodsReceiptNote) {
        let entry = self.gate_entry().await;
        let grn = self
            .grns
            .create_grn(&warehouse(), grn_input(&entry))
            .await
            .unwrap();
        (entry, grn)
    }

    /// A GRN with sampling requested; returns the sample and its default tests
    pub async fn sampled(&self) -> (QualitySample, Vec<QualityTest>) {
        let (_, grn) = self.received().await;
        let sample = self
            .samples
            .request_sampling(&qa_manager(), grn.id, RequestSamplingInput::default())
            .await
            .unwrap();
        let tests = self
            .samples
            .sample_tests(&qc_manager(), sample.id)
            .await
            .unwrap();
        (sample, tests)
    }

    /// A sampled GRN whose sample is assigned to `analyst()`
    pub async fn assigned(&self) -> (QualitySample, Vec<QualityTest>) {
        let (sample, tests) = self.sampled().await;
        let sample = self
            .samples
            .assign_sample(
                &qc_manager(),
                sample.id,
                AssignSampleInput {
                    analyst_id: analyst().id,
                },
            )
            .await
            .unwrap();
        (sample, tests)
    }

    /// Register `second_analyst()` in the directory
    pub async fn hire_second_analyst(&self) {
        let actor = second_analyst();
        self.memory
            .add_user(UserRecord {
                id: actor.id,
                name: actor.name,
                email: "ken.adams@pharma.com".to_string(),
                role: Role::QcOperator,
                department: "Quality Control".to_string(),
                plant_id: Some("plant-a".to_string()),
                is_active: true,
            })
            .await;
    }
}

pub fn security() -> Actor {
    Actor::new("sec-off-1", "Jennifer Lee", Role::SecurityOfficer)
}

pub fn warehouse() -> Actor {
    Actor::new("scm-wh-1", "James Wilson", Role::WarehouseManager)
}

pub fn qa_manager() -> Actor {
    Actor::new("qa-man-1", "Priya Sharma", Role::QaManager)
}

pub fn qa_officer() -> Actor {
    Actor::new("qa-op-1", "Emily Brown", Role::QaOperator)
}

pub fn qc_manager() -> Actor {
    Actor::new("qc-man-1", "Robert Taylor", Role::QcManager)
}

pub fn analyst() -> Actor {
    Actor::new("qc-op-1", "Lisa Anderson", Role::QcOperator)
}

pub fn second_analyst() -> Actor {
    Actor::new("qc-op-2", "Ken Adams", Role::QcOperator)
}

pub fn gate_entry_input(material: &str, quantity: i64) -> CreateGateEntryInput {
    CreateGateEntryInput {
        material_name: material.to_string(),
        material_category: Some("Excipient".to_string()),
        po_number: Some("PO-2024-001".to_string()),
        vehicle_name: Some("Tata 407".to_string()),
        vehicle_number: "MH12AB1234".to_string(),
        driver_name: Some("Ramesh".to_string()),
        driver_contact: Some("9876543210".to_string()),
        supplier_name: Some("Acme Chemicals".to_string()),
        document_number: Some("INV-7788".to_string()),
        quantity: Decimal::from(quantity),
        uom: Some("kg".to_string()),
        remarks: None,
        seal_intact: true,
        plant_id: Some("plant-a".to_string()),
    }
}

pub fn grn_item(quantity: i64, price: i64, vat_rate: Option<i64>) -> GrnItemInput {
    GrnItemInput {
        description: "Lactose monohydrate".to_string(),
        stock_code: Some("LAC-001".to_string()),
        status: None,
        quantity: Decimal::from(quantity),
        price: Decimal::from(price),
        vat_rate: vat_rate.map(Decimal::from),
        nominal: None,
        account: None,
    }
}

pub fn grn_input(entry: &GateEntry) -> CreateGrnInput {
    CreateGrnInput {
        gate_entry_id: entry.id,
        po_number: "PO-2024-001".to_string(),
        delivery_challan: Some("DC-42".to_string()),
        quantity_received: entry.quantity,
        remarks: None,
        supplier_name: entry.supplier_name.clone(),
        supplier_address: None,
        supplier_location: None,
        supplier_contact: None,
        document_status: None,
        document_date: None,
        delivery_date: None,
        period: None,
        reference: None,
        comment: None,
        items: vec![grn_item(500, 10, Some(5))],
    }
}
