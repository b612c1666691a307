use prost::Message;
use std::sync::Arc;
use tuplesink::bus::ThreadClientMap;
use tuplesink::catalog::Attribute;
use tuplesink::destination::{reconstruct_from_description, validate_description};
use tuplesink::proto::{
    BlockLayoutDescription, InsertDestinationDescription, InsertDestinationKind,
    decode_description,
};
use tuplesink::{
    AttributeType, BlockLayout, CatalogRelation, InsertDestination, MessageBus, PartitionFunction,
    PartitionScheme, RelationSchema, SinkError, StorageManager, Tuple, TypedValue,
};

fn relation(partitioned: bool) -> Arc<CatalogRelation> {
    let schema = RelationSchema::new(vec![
        Attribute::new("k", AttributeType::Int),
        Attribute::new("v", AttributeType::Text),
    ]);
    let layout = BlockLayout::new(2, 8).unwrap();
    let relation = CatalogRelation::new(44, "plans", schema, layout).unwrap();
    if partitioned {
        let scheme = PartitionScheme::new(PartitionFunction::Modulo, 0, 4).unwrap();
        Arc::new(relation.with_partition_scheme(scheme).unwrap())
    } else {
        Arc::new(relation)
    }
}

fn description(kind: InsertDestinationKind) -> InsertDestinationDescription {
    InsertDestinationDescription {
        kind: kind as i32,
        relation_id: 44,
        layout: Some(BlockLayoutDescription {
            tuple_capacity: 8,
            num_attributes: 2,
        }),
        operator_index: 3,
        scheduler_client_id: 1,
        partitioning_attribute: None,
    }
}

#[test]
fn partition_aware_descriptor_needs_a_partitioned_relation() {
    let result = validate_description(
        &description(InsertDestinationKind::PartitionAware),
        &relation(false),
    );
    assert!(matches!(result, Err(SinkError::ProtocolInvalid(_))));

    validate_description(
        &description(InsertDestinationKind::PartitionAware),
        &relation(true),
    )
    .unwrap();
}

#[test]
fn validator_rejects_malformed_descriptors() {
    let relation = relation(true);

    let mut wrong_relation = description(InsertDestinationKind::BlockPool);
    wrong_relation.relation_id = 45;
    assert!(validate_description(&wrong_relation, &relation).is_err());

    let mut unknown_kind = description(InsertDestinationKind::BlockPool);
    unknown_kind.kind = 99;
    assert!(validate_description(&unknown_kind, &relation).is_err());

    let mut empty_layout = description(InsertDestinationKind::BlockPool);
    empty_layout.layout = Some(BlockLayoutDescription {
        tuple_capacity: 0,
        num_attributes: 2,
    });
    assert!(validate_description(&empty_layout, &relation).is_err());

    let mut misshapen_layout = description(InsertDestinationKind::BlockPool);
    misshapen_layout.layout = Some(BlockLayoutDescription {
        tuple_capacity: 8,
        num_attributes: 5,
    });
    assert!(validate_description(&misshapen_layout, &relation).is_err());

    let mut wrong_attribute = description(InsertDestinationKind::PartitionAware);
    wrong_attribute.partitioning_attribute = Some(1);
    assert!(validate_description(&wrong_attribute, &relation).is_err());

    let mut right_attribute = description(InsertDestinationKind::PartitionAware);
    right_attribute.partitioning_attribute = Some(0);
    validate_description(&right_attribute, &relation).unwrap();
}

#[test]
fn descriptors_reencode_byte_identically() {
    for kind in [
        InsertDestinationKind::AlwaysCreate,
        InsertDestinationKind::BlockPool,
        InsertDestinationKind::PartitionAware,
    ] {
        let mut original = description(kind);
        if kind == InsertDestinationKind::PartitionAware {
            original.partitioning_attribute = Some(0);
        }
        let encoded = original.encode_to_vec();
        let decoded = decode_description(&encoded).unwrap();
        assert_eq!(decoded.encode_to_vec(), encoded);
    }
}

#[test]
fn truncated_descriptor_bytes_fail_to_decode() {
    let encoded = description(InsertDestinationKind::BlockPool).encode_to_vec();
    assert!(matches!(
        decode_description(&encoded[..encoded.len() - 1]),
        Err(SinkError::Decode(_))
    ));
}

#[test]
fn reconstructed_destinations_insert_with_the_descriptor_layout() {
    let bus = Arc::new(MessageBus::new());
    let (scheduler_id, scheduler_rx) = bus.connect();
    let (worker_id, _worker_rx) = bus.connect();
    let _registration = ThreadClientMap::global().register_current(worker_id);
    let storage_manager = Arc::new(StorageManager::new());
    let relation = relation(false);

    // Capacity 2 overrides the relation's default of 8.
    let mut desc = description(InsertDestinationKind::BlockPool);
    desc.scheduler_client_id = scheduler_id;
    desc.layout = Some(BlockLayoutDescription {
        tuple_capacity: 2,
        num_attributes: 2,
    });

    let destination = reconstruct_from_description(
        &desc,
        Arc::clone(&relation),
        Arc::clone(&storage_manager),
        Arc::clone(&bus),
    )
    .unwrap();

    for k in 0..2 {
        destination
            .insert_tuple(&Tuple::new(vec![
                TypedValue::Int(k),
                TypedValue::Text("x".into()),
            ]))
            .unwrap();
    }

    // Two tuples fill the two-slot block and seal it.
    assert_eq!(scheduler_rx.try_iter().count(), 1);
    assert!(destination.partially_filled_blocks().is_empty());
    assert_eq!(destination.touched_blocks().len(), 1);
}

#[test]
fn reconstruction_covers_all_three_strategies() {
    let bus = Arc::new(MessageBus::new());
    let (scheduler_id, _scheduler_rx) = bus.connect();
    let storage_manager = Arc::new(StorageManager::new());

    for (kind, partitioned) in [
        (InsertDestinationKind::AlwaysCreate, false),
        (InsertDestinationKind::BlockPool, false),
        (InsertDestinationKind::PartitionAware, true),
    ] {
        let relation = relation(partitioned);
        let mut desc = description(kind);
        desc.scheduler_client_id = scheduler_id;
        let destination = reconstruct_from_description(
            &desc,
            relation,
            Arc::clone(&storage_manager),
            Arc::clone(&bus),
        )
        .unwrap();
        let expected = if partitioned { Some(0) } else { None };
        assert_eq!(destination.partitioning_attribute(), expected);
    }
}

#[test]
fn reconstruction_fails_on_an_invalid_descriptor() {
    let bus = Arc::new(MessageBus::new());
    let storage_manager = Arc::new(StorageManager::new());
    let desc = description(InsertDestinationKind::PartitionAware);
    let result = reconstruct_from_description(&desc, relation(false), storage_manager, bus);
    assert!(matches!(result, Err(SinkError::ProtocolInvalid(_))));
}
